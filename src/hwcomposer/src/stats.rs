use crate::buffer::BufferFlags;
use crate::layer::Blending;
use crate::layer::LayerList;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FrameStats {
    pub num_app_layers: usize,
    pub yuv_count: usize,
    pub yuv_indices: Vec<usize>,
    pub skip_count: usize,
    pub skip_layer_indices: Vec<usize>,
    /// The layer only the external display may show.
    pub ext_only_index: Option<usize>,
    pub premultiplied_alpha: bool,
    pub needs_alpha_scale: bool,
    /// A protected video layer is present.
    pub secure_yuv: bool,
    /// The layer carrying stereoscopic content.
    pub s3d_index: Option<usize>,
}

impl FrameStats {
    pub fn compute(list: &LayerList) -> FrameStats {
        let mut stats = FrameStats {
            num_app_layers: list.layers.len(),
            ..Default::default()
        };
        for (i, layer) in list.layers.iter().enumerate() {
            if layer.is_skip() {
                stats.skip_count += 1;
                stats.skip_layer_indices.push(i);
            }
            if layer.blending == Blending::Premultiplied {
                stats.premultiplied_alpha = true;
            }
            if layer.plane_alpha != 0xff {
                stats.needs_alpha_scale = true;
            }
            let handle = match &layer.handle {
                Some(handle) => handle,
                None => continue,
            };
            if handle.is_yuv() {
                stats.yuv_count += 1;
                stats.yuv_indices.push(i);
                if handle.is_secure() {
                    stats.secure_yuv = true;
                }
                if stats.s3d_index.is_none() && handle.format_3d().is_3d() {
                    stats.s3d_index = Some(i);
                }
            }
            if stats.ext_only_index.is_none() && handle.flags.contains(BufferFlags::EXTERNAL_ONLY)
            {
                stats.ext_only_index = Some(i);
            }
        }
        trace!("frame stats: {:?}", stats);
        stats
    }

    pub fn has_skip_layers(&self) -> bool {
        self.skip_count > 0
    }
}
