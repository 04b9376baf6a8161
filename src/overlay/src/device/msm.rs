//! msm: `MdpDevice` and `RotatorDevice` over the msm framebuffer, msm_rotator and ion nodes.
//! The structures below mirror the kernel uapi headers and must not be reordered.

#![allow(non_camel_case_types)]

use std::collections::BTreeMap;
use std::fs::File;
use std::fs::OpenOptions;
use std::os::raw::c_int;
use std::os::raw::c_uchar;
use std::os::raw::c_uint;
use std::os::unix::io::AsRawFd;
use std::os::unix::io::RawFd;

use libc::size_t;
use nix::ioctl_read;
use nix::ioctl_read_bad;
use nix::ioctl_readwrite;
use nix::ioctl_write_ptr;

use crate::device::*;
use crate::formats::PixelFormat;
use crate::geometry::Dimension;
use crate::geometry::PipeFlags;
use crate::geometry::PipeGeometry;
use crate::geometry::PipeType;
use crate::geometry::Rect;
use crate::geometry::Transform;
use crate::overlay_utils::*;
use crate::zorder::Mixer;

const MSMFB_IOCTL_MAGIC: u8 = b'm';
const MSM_ROTATOR_IOCTL_MAGIC: u8 = b'R';
const ION_IOC_MAGIC: u8 = b'I';
const FB_IOCTL_MAGIC: u8 = b'F';
const FBIOGET_VSCREENINFO: c_uint = 0x4600;

/// Pipe id asking the driver to allocate a new pipe.
const MSMFB_NEW_REQUEST: u32 = u32::MAX;

// mdp_overlay.flags
const MDP_ROT_MASK: u32 = 0x7;
const MDP_DEINTERLACE: u32 = 0x8000_0000;
const MDP_SHARPENING: u32 = 0x0020_0000;
const MDP_SECURE_OVERLAY_SESSION: u32 = 0x0000_8000;
const MDP_OV_PIPE_FORCE_DMA: u32 = 0x0000_4000;
const MDP_OV_PIPE_SHARE: u32 = 0x0040_0000;
const MDP_BACKEND_COMPOSITION: u32 = 0x0004_0000;
const MDP_SOURCE_ROTATED_90: u32 = 0x0010_0000;
const MDP_OV_PLAY_NOWAIT: u32 = 0x0020_0000;

// Bits of the dpp_ctrl.ops word.
const DPP_OP_SHARP: u32 = 0x1;
const DPP_OP_HSIC: u32 = 0x2;

const ION_CP_MM_HEAP_ID: u32 = 8;
const ION_SECURE: u32 = 1 << 31;
const ROTATOR_BUFFER_ALIGN: usize = 4096;

const DEV_ROTATOR: &str = "/dev/msm_rotator";
const DEV_ION: &str = "/dev/ion";

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct fb_bitfield {
    offset: u32,
    length: u32,
    msb_right: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct fb_var_screeninfo {
    xres: u32,
    yres: u32,
    xres_virtual: u32,
    yres_virtual: u32,
    xoffset: u32,
    yoffset: u32,
    bits_per_pixel: u32,
    grayscale: u32,
    red: fb_bitfield,
    green: fb_bitfield,
    blue: fb_bitfield,
    transp: fb_bitfield,
    nonstd: u32,
    activate: u32,
    height: u32,
    width: u32,
    accel_flags: u32,
    pixclock: u32,
    left_margin: u32,
    right_margin: u32,
    upper_margin: u32,
    lower_margin: u32,
    hsync_len: u32,
    vsync_len: u32,
    sync: u32,
    vmode: u32,
    rotate: u32,
    colorspace: u32,
    reserved: [u32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct mdp_rect {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct msmfb_img {
    width: u32,
    height: u32,
    format: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct dpp_ctrl {
    ops: u32,
    sharp_strength: i32,
    hue: i32,
    sat: i32,
    intensity: i32,
    contrast: i32,
}

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct mdp_overlay {
    src: msmfb_img,
    src_rect: mdp_rect,
    dst_rect: mdp_rect,
    z_order: u32,
    is_fg: u32,
    alpha: u32,
    transp_mask: u32,
    flags: u32,
    id: u32,
    user_data: [u32; 8],
    dpp: dpp_ctrl,
}

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct msmfb_data {
    offset: u32,
    memory_id: c_int,
    id: c_int,
    flags: u32,
    priv_: u32,
    iova: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct msmfb_overlay_data {
    id: u32,
    data: msmfb_data,
    version_key: u32,
    plane1_data: msmfb_data,
    plane2_data: msmfb_data,
    dst_data: msmfb_data,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct mdp_buf_sync {
    flags: u32,
    acq_fen_fd_cnt: u32,
    session_id: u32,
    acq_fen_fd: *const c_int,
    rel_fen_fd: *mut c_int,
}

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct msm_rotator_img_info {
    session_id: c_uint,
    src: msmfb_img,
    dst: msmfb_img,
    src_rect: mdp_rect,
    dst_x: c_uint,
    dst_y: c_uint,
    rotations: c_uchar,
    enable: c_int,
    downscale_ratio: c_uint,
    secure: c_uint,
}

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct msm_rotator_data_info {
    session_id: c_int,
    src: msmfb_data,
    dst: msmfb_data,
    version_key: c_uint,
    src_chroma: msmfb_data,
    dst_chroma: msmfb_data,
}

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct ion_allocation_data {
    len: size_t,
    align: size_t,
    heap_id_mask: c_uint,
    flags: c_uint,
    handle: c_int,
}

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct ion_fd_data {
    handle: c_int,
    fd: c_int,
}

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct ion_handle_data {
    handle: c_int,
}

ioctl_read_bad!(fbioget_vscreeninfo, FBIOGET_VSCREENINFO, fb_var_screeninfo);
ioctl_write_ptr!(fbio_waitforvsync, FB_IOCTL_MAGIC, 0x20, u32);
ioctl_readwrite!(msmfb_overlay_set, MSMFB_IOCTL_MAGIC, 135, mdp_overlay);
ioctl_write_ptr!(msmfb_overlay_unset, MSMFB_IOCTL_MAGIC, 136, c_uint);
ioctl_write_ptr!(msmfb_overlay_play, MSMFB_IOCTL_MAGIC, 137, msmfb_overlay_data);
ioctl_read!(msmfb_overlay_get, MSMFB_IOCTL_MAGIC, 140, mdp_overlay);
ioctl_write_ptr!(msmfb_buffer_sync, MSMFB_IOCTL_MAGIC, 165, mdp_buf_sync);
ioctl_readwrite!(
    msm_rotator_start,
    MSM_ROTATOR_IOCTL_MAGIC,
    1,
    msm_rotator_img_info
);
ioctl_write_ptr!(
    msm_rotator_rotate,
    MSM_ROTATOR_IOCTL_MAGIC,
    2,
    msm_rotator_data_info
);
ioctl_write_ptr!(msm_rotator_finish, MSM_ROTATOR_IOCTL_MAGIC, 3, c_int);
ioctl_readwrite!(ion_ioc_alloc, ION_IOC_MAGIC, 0, ion_allocation_data);
ioctl_readwrite!(ion_ioc_free, ION_IOC_MAGIC, 1, ion_handle_data);
ioctl_readwrite!(ion_ioc_map, ION_IOC_MAGIC, 2, ion_fd_data);

fn open_node(path: &str) -> OverlayResult<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| {
            error!("failed to open {}: {}", path, e);
            OverlayError::DeviceUnavailable(path.to_string())
        })
}

fn rejected(op: &'static str, e: nix::Error) -> OverlayError {
    OverlayError::DriverRejected {
        op,
        reason: e.to_string(),
    }
}

impl From<Rect> for mdp_rect {
    fn from(r: Rect) -> mdp_rect {
        mdp_rect {
            x: r.x,
            y: r.y,
            w: r.w,
            h: r.h,
        }
    }
}

impl From<mdp_rect> for Rect {
    fn from(r: mdp_rect) -> Rect {
        Rect::new(r.x, r.y, r.w, r.h)
    }
}

/// Translates a geometry to the kernel layout. Only this function and its inverse know the
/// flag encoding of the driver.
fn to_kernel(id: u32, geometry: &PipeGeometry, dpp: dpp_ctrl) -> mdp_overlay {
    // A prerotated source reaches the pipe upright.
    let mut flags = if geometry.flags.contains(PipeFlags::PREROTATED) {
        if geometry.transform.rotation().swaps_axes() {
            MDP_SOURCE_ROTATED_90
        } else {
            0
        }
    } else {
        geometry.transform.bits() & MDP_ROT_MASK
    };
    if geometry.flags.contains(PipeFlags::INTERLACED) {
        flags |= MDP_DEINTERLACE;
    }
    if geometry.flags.contains(PipeFlags::SHARPENING) {
        flags |= MDP_SHARPENING;
    }
    if geometry.flags.contains(PipeFlags::SECURE) {
        flags |= MDP_SECURE_OVERLAY_SESSION;
    }
    if geometry.flags.contains(PipeFlags::BACKEND_DEINTERLACE) {
        flags |= MDP_BACKEND_COMPOSITION;
    }
    flags |= match geometry.pipe_type {
        PipeType::Dma => MDP_OV_PIPE_FORCE_DMA,
        PipeType::Rgb | PipeType::Vg => MDP_OV_PIPE_SHARE,
    };
    mdp_overlay {
        src: msmfb_img {
            width: geometry.src.width,
            height: geometry.src.height,
            format: geometry.format.mdp_format(),
        },
        src_rect: geometry.crop.into(),
        dst_rect: geometry.dst.into(),
        z_order: geometry.z_order,
        is_fg: geometry.flags.contains(PipeFlags::FG) as u32,
        alpha: 0xff,
        transp_mask: u32::MAX,
        flags,
        id,
        user_data: [0; 8],
        dpp,
    }
}

fn from_kernel(ov: &mdp_overlay) -> OverlayResult<PipeGeometry> {
    let format = PixelFormat::from_mdp_format(ov.src.format)
        .ok_or(OverlayError::InvalidFormat(ov.src.format))?;
    let mut geometry = PipeGeometry::new(Dimension::new(ov.src.width, ov.src.height), format);
    geometry.crop = ov.src_rect.into();
    geometry.dst = ov.dst_rect.into();
    geometry.transform = Transform::from_bits_truncate(ov.flags & MDP_ROT_MASK);
    geometry.z_order = ov.z_order;
    let mut flags = PipeFlags::empty();
    flags.set(PipeFlags::FG, ov.is_fg != 0);
    flags.set(PipeFlags::INTERLACED, ov.flags & MDP_DEINTERLACE != 0);
    flags.set(PipeFlags::SHARPENING, ov.flags & MDP_SHARPENING != 0);
    flags.set(PipeFlags::SECURE, ov.flags & MDP_SECURE_OVERLAY_SESSION != 0);
    flags.set(PipeFlags::PREROTATED, ov.flags & MDP_SOURCE_ROTATED_90 != 0);
    flags.set(
        PipeFlags::BACKEND_DEINTERLACE,
        ov.flags & MDP_BACKEND_COMPOSITION != 0,
    );
    geometry.flags = flags;
    if ov.flags & MDP_OV_PIPE_FORCE_DMA != 0 {
        geometry.pipe_type = PipeType::Dma;
    }
    Ok(geometry)
}

/// `/dev/graphics/fb<N>` of one mixer.
pub struct MsmMdp {
    fb: File,
    mixer: Mixer,
    dpp: BTreeMap<PipeId, dpp_ctrl>,
}

impl MsmMdp {
    pub fn open(mixer: Mixer) -> OverlayResult<MsmMdp> {
        let path = format!("/dev/graphics/fb{}", mixer.fb_index());
        let fb = open_node(&path)?;
        Ok(MsmMdp {
            fb,
            mixer,
            dpp: BTreeMap::new(),
        })
    }
}

impl MdpDevice for MsmMdp {
    fn screen_info(&self) -> OverlayResult<ScreenInfo> {
        let mut info = fb_var_screeninfo::default();
        // Safe because the kernel writes at most size_of::<fb_var_screeninfo>() bytes.
        unsafe {
            fbioget_vscreeninfo(self.fb.as_raw_fd(), &mut info)
                .map_err(|e| rejected("FBIOGET_VSCREENINFO", e))?;
        }
        if info.xres == 0 || info.yres == 0 {
            return Err(OverlayError::DeviceUnavailable(self.mixer.to_string()));
        }
        Ok(ScreenInfo {
            xres: info.xres,
            yres: info.yres,
            xres_virtual: info.xres_virtual,
            yres_virtual: info.yres_virtual,
            bits_per_pixel: info.bits_per_pixel,
        })
    }

    fn overlay_set(&mut self, id: Option<PipeId>, geometry: &PipeGeometry) -> OverlayResult<PipeId> {
        let dpp = id
            .and_then(|id| self.dpp.get(&id).copied())
            .unwrap_or_default();
        let mut ov = to_kernel(id.unwrap_or(MSMFB_NEW_REQUEST), geometry, dpp);
        // Safe because `ov` is a fully initialized mdp_overlay owned by this frame.
        unsafe {
            msmfb_overlay_set(self.fb.as_raw_fd(), &mut ov)
                .map_err(|e| rejected("MSMFB_OVERLAY_SET", e))?;
        }
        Ok(ov.id)
    }

    fn overlay_get(&self, id: PipeId) -> OverlayResult<PipeGeometry> {
        let mut ov = mdp_overlay {
            id,
            ..Default::default()
        };
        // Safe because the driver only fills in the structure we own.
        unsafe {
            msmfb_overlay_get(self.fb.as_raw_fd(), &mut ov)
                .map_err(|e| rejected("MSMFB_OVERLAY_GET", e))?;
        }
        from_kernel(&ov)
    }

    fn overlay_unset(&mut self, id: PipeId) -> OverlayResult<()> {
        let ndx: c_uint = id;
        self.dpp.remove(&id);
        // Safe because the driver only reads the pipe index.
        unsafe {
            msmfb_overlay_unset(self.fb.as_raw_fd(), &ndx)
                .map_err(|e| rejected("MSMFB_OVERLAY_UNSET", e))?;
        }
        Ok(())
    }

    fn overlay_play(&mut self, play: &PlayRequest) -> OverlayResult<()> {
        let od = msmfb_overlay_data {
            id: play.id,
            data: msmfb_data {
                offset: play.offset,
                memory_id: play.fd,
                flags: MDP_OV_PLAY_NOWAIT,
                ..Default::default()
            },
            ..Default::default()
        };
        // Safe because the driver only reads the request.
        unsafe {
            msmfb_overlay_play(self.fb.as_raw_fd(), &od)
                .map_err(|e| rejected("MSMFB_OVERLAY_PLAY", e))?;
        }
        Ok(())
    }

    fn set_visual_param(&mut self, id: PipeId, param: VisualParam, value: i32) -> OverlayResult<()> {
        let value = VisualParam::validate(value)?;
        let dpp = self.dpp.entry(id).or_default();
        match param {
            VisualParam::Sharpness => {
                dpp.ops |= DPP_OP_SHARP;
                dpp.sharp_strength = value;
            }
            VisualParam::Hue => {
                dpp.ops |= DPP_OP_HSIC;
                dpp.hue = value;
            }
            VisualParam::Saturation => {
                dpp.ops |= DPP_OP_HSIC;
                dpp.sat = value;
            }
            VisualParam::Intensity => {
                dpp.ops |= DPP_OP_HSIC;
                dpp.intensity = value;
            }
            VisualParam::Contrast => {
                dpp.ops |= DPP_OP_HSIC;
                dpp.contrast = value;
            }
        }
        // The knobs take effect with the next MSMFB_OVERLAY_SET of this pipe.
        Ok(())
    }

    fn buffer_sync(&mut self, acquire_fences: &[RawFd]) -> OverlayResult<Option<RawFd>> {
        let mut release: c_int = -1;
        let sync = mdp_buf_sync {
            flags: 0,
            acq_fen_fd_cnt: u32::try_from(acquire_fences.len())?,
            session_id: 0,
            acq_fen_fd: acquire_fences.as_ptr(),
            rel_fen_fd: &mut release,
        };
        // Safe because both pointers outlive the call and the count matches the slice.
        unsafe {
            msmfb_buffer_sync(self.fb.as_raw_fd(), &sync)
                .map_err(|e| rejected("MSMFB_BUFFER_SYNC", e))?;
        }
        Ok(if release >= 0 { Some(release) } else { None })
    }

    fn wait_for_vsync(&mut self) -> OverlayResult<()> {
        let crtc: u32 = 0;
        // Safe because the driver only reads the crtc index.
        unsafe {
            fbio_waitforvsync(self.fb.as_raw_fd(), &crtc)
                .map_err(|e| rejected("FBIO_WAITFORVSYNC", e))?;
        }
        Ok(())
    }
}

/// `/dev/msm_rotator` with output memory from the ion multimedia heap.
pub struct MsmRotator {
    rot: File,
    ion: File,
}

impl MsmRotator {
    pub fn open() -> OverlayResult<MsmRotator> {
        Ok(MsmRotator {
            rot: open_node(DEV_ROTATOR)?,
            ion: open_node(DEV_ION)?,
        })
    }
}

impl RotatorDevice for MsmRotator {
    fn start(&mut self, info: &RotatorSessionInfo) -> OverlayResult<u32> {
        let mut img = msm_rotator_img_info {
            session_id: 0,
            src: msmfb_img {
                width: info.src.width,
                height: info.src.height,
                format: info.src_format.mdp_format(),
            },
            dst: msmfb_img {
                width: info.dst.width,
                height: info.dst.height,
                format: info.dst_format.mdp_format(),
            },
            src_rect: info.src_rect.into(),
            rotations: (info.transform.bits() & MDP_ROT_MASK) as c_uchar,
            enable: 1,
            secure: info.secure as c_uint,
            ..Default::default()
        };
        // Safe because the kernel writes back only the session id.
        unsafe {
            msm_rotator_start(self.rot.as_raw_fd(), &mut img)
                .map_err(|e| rejected("MSM_ROTATOR_IOCTL_START", e))?;
        }
        Ok(img.session_id)
    }

    fn rotate(&mut self, job: &RotatorJob) -> OverlayResult<()> {
        let data = msm_rotator_data_info {
            session_id: job.session as c_int,
            src: msmfb_data {
                offset: job.src_offset,
                memory_id: job.src_fd,
                ..Default::default()
            },
            dst: msmfb_data {
                offset: job.dst_offset,
                memory_id: job.dst_fd,
                ..Default::default()
            },
            ..Default::default()
        };
        // Safe because the driver only reads the request.
        unsafe {
            msm_rotator_rotate(self.rot.as_raw_fd(), &data)
                .map_err(|e| rejected("MSM_ROTATOR_IOCTL_ROTATE", e))?;
        }
        Ok(())
    }

    fn finish(&mut self, session: u32) -> OverlayResult<()> {
        let id = session as c_int;
        // Safe because the driver only reads the session id.
        unsafe {
            msm_rotator_finish(self.rot.as_raw_fd(), &id)
                .map_err(|e| rejected("MSM_ROTATOR_IOCTL_FINISH", e))?;
        }
        Ok(())
    }

    fn alloc_buffers(
        &mut self,
        slot_size: usize,
        count: usize,
        secure: bool,
    ) -> OverlayResult<RotatorMemory> {
        let exhausted = OverlayError::RotatorMemory {
            size: slot_size,
            count,
        };
        let slot_size = (slot_size + ROTATOR_BUFFER_ALIGN - 1) & !(ROTATOR_BUFFER_ALIGN - 1);
        let len = match slot_size.checked_mul(count) {
            Some(len) => len,
            None => return Err(exhausted),
        };
        let mut alloc = ion_allocation_data {
            len,
            align: ROTATOR_BUFFER_ALIGN,
            heap_id_mask: 1 << ION_CP_MM_HEAP_ID,
            flags: if secure { ION_SECURE } else { 0 },
            handle: 0,
        };
        // Safe because the kernel only writes back the handle.
        if let Err(e) = unsafe { ion_ioc_alloc(self.ion.as_raw_fd(), &mut alloc) } {
            error!("rotator ion allocation of {} bytes failed: {}", len, e);
            return Err(exhausted);
        }
        let mut map = ion_fd_data {
            handle: alloc.handle,
            fd: -1,
        };
        // Safe because the kernel only writes back the fd.
        if let Err(e) = unsafe { ion_ioc_map(self.ion.as_raw_fd(), &mut map) } {
            error!("rotator ion map failed: {}", e);
            let mut free = ion_handle_data {
                handle: alloc.handle,
            };
            // Safe because the handle was returned by ION_IOC_ALLOC above.
            let _ = unsafe { ion_ioc_free(self.ion.as_raw_fd(), &mut free) };
            return Err(exhausted);
        }
        Ok(RotatorMemory {
            handle: alloc.handle as u32,
            fd: map.fd,
            slot_size,
            count,
        })
    }

    fn free_buffers(&mut self, memory: &RotatorMemory) {
        // Safe because the fd came from ION_IOC_MAP and is owned by `memory`.
        unsafe {
            libc::close(memory.fd);
        }
        let mut free = ion_handle_data {
            handle: memory.handle as c_int,
        };
        // Safe because the handle came from ION_IOC_ALLOC.
        if let Err(e) = unsafe { ion_ioc_free(self.ion.as_raw_fd(), &mut free) } {
            warn!("failed to free rotator memory: {}", e);
        }
    }
}

/// Opens the real msm device nodes.
#[derive(Default)]
pub struct MsmDeviceFactory;

impl DeviceFactory for MsmDeviceFactory {
    fn open_mdp(&self, mixer: Mixer) -> OverlayResult<Box<dyn MdpDevice>> {
        Ok(Box::new(MsmMdp::open(mixer)?))
    }

    fn open_rotator(&self) -> OverlayResult<Box<dyn RotatorDevice>> {
        Ok(Box::new(MsmRotator::open()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::PixelFormat;

    #[test]
    fn kernel_translation_round_trips() {
        let mut geometry = PipeGeometry::new(
            Dimension::new(1280, 736),
            PixelFormat::YCbCr420SemiPlanarTiled,
        );
        geometry.crop = Rect::new(0, 0, 1280, 720);
        geometry.dst = Rect::new(0, 0, 1920, 1080);
        geometry.transform = Transform::ROT_90;
        geometry.z_order = 1;
        geometry.flags = PipeFlags::FG | PipeFlags::INTERLACED;

        let ov = to_kernel(7, &geometry, dpp_ctrl::default());
        assert_eq!(ov.id, 7);
        assert_eq!(ov.flags & MDP_ROT_MASK, 0x4);
        assert_eq!(ov.is_fg, 1);
        assert_eq!(ov.src.format, PixelFormat::YCbCr420SemiPlanarTiled.mdp_format());
        assert_eq!(from_kernel(&ov).unwrap(), geometry);
    }

    #[test]
    fn prerotated_source_is_sent_upright() {
        let mut geometry =
            PipeGeometry::new(Dimension::new(736, 1280), PixelFormat::YCbCr420SemiPlanar);
        geometry.transform = Transform::ROT_90;
        geometry.flags = PipeFlags::PREROTATED;
        let ov = to_kernel(3, &geometry, dpp_ctrl::default());
        assert_eq!(ov.flags & MDP_ROT_MASK, 0);
        assert_ne!(ov.flags & MDP_SOURCE_ROTATED_90, 0);
        assert_eq!((ov.src.width, ov.src.height), (736, 1280));
        assert_eq!(ov.src.format, PixelFormat::YCbCr420SemiPlanar.mdp_format());
    }

    #[test]
    fn dma_pipes_are_forced() {
        let mut geometry = PipeGeometry::new(Dimension::new(64, 64), PixelFormat::Rgb565);
        geometry.pipe_type = PipeType::Dma;
        let ov = to_kernel(MSMFB_NEW_REQUEST, &geometry, dpp_ctrl::default());
        assert_ne!(ov.flags & MDP_OV_PIPE_FORCE_DMA, 0);
        assert_eq!(from_kernel(&ov).unwrap().pipe_type, PipeType::Dma);
    }
}
