//! fake: in-memory mixers and rotator that record every call, for tests.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::sync::Mutex;

use crate::device::*;
use crate::geometry::PipeGeometry;
use crate::overlay_utils::*;
use crate::zorder::Mixer;

/// Descriptor handed out for fake rotator memory.
pub const FAKE_ROTATOR_FD: RawFd = 1000;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DeviceCall {
    OpenMdp(Mixer),
    OpenRotator,
    Set {
        mixer: Mixer,
        id: PipeId,
        geometry: PipeGeometry,
    },
    Get {
        mixer: Mixer,
        id: PipeId,
    },
    Unset {
        mixer: Mixer,
        id: PipeId,
    },
    Play {
        mixer: Mixer,
        id: PipeId,
        fd: RawFd,
        offset: u32,
    },
    VisualParam {
        mixer: Mixer,
        id: PipeId,
        param: VisualParam,
        value: i32,
    },
    BufferSync {
        mixer: Mixer,
        fences: usize,
    },
    WaitVsync(Mixer),
    RotatorStart {
        session: u32,
        info: RotatorSessionInfo,
    },
    Rotate(RotatorJob),
    RotatorFinish(u32),
    RotatorAlloc {
        slot_size: usize,
        count: usize,
    },
    RotatorFree(u32),
}

#[derive(Default)]
struct FakeState {
    calls: Vec<DeviceCall>,
    screens: BTreeMap<Mixer, ScreenInfo>,
    pipes: BTreeMap<(Mixer, PipeId), PipeGeometry>,
    next_id: PipeId,
    next_session: u32,
    next_handle: u32,
    reject_set: BTreeSet<Mixer>,
    rotator_missing: bool,
    rotator_alloc_fails: bool,
}

/// Shared handle over the fake hardware. Clones observe the same state.
#[derive(Clone, Default)]
pub struct FakeDevices {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDevices {
    /// A target with only a primary panel of `width` x `height`.
    pub fn new(width: u32, height: u32) -> FakeDevices {
        let devices = FakeDevices::default();
        devices.set_screen(Mixer::Primary, width, height);
        devices
    }

    pub fn set_screen(&self, mixer: Mixer, width: u32, height: u32) {
        self.state.lock().unwrap().screens.insert(
            mixer,
            ScreenInfo {
                xres: width,
                yres: height,
                xres_virtual: width,
                yres_virtual: height * 2,
                bits_per_pixel: 32,
            },
        );
    }

    pub fn remove_screen(&self, mixer: Mixer) {
        self.state.lock().unwrap().screens.remove(&mixer);
    }

    /// Makes every MSMFB_OVERLAY_SET on `mixer` fail until cleared.
    pub fn reject_overlay_set(&self, mixer: Mixer, reject: bool) {
        let mut state = self.state.lock().unwrap();
        if reject {
            state.reject_set.insert(mixer);
        } else {
            state.reject_set.remove(&mixer);
        }
    }

    pub fn set_rotator_missing(&self, missing: bool) {
        self.state.lock().unwrap().rotator_missing = missing;
    }

    pub fn set_rotator_alloc_fails(&self, fails: bool) {
        self.state.lock().unwrap().rotator_alloc_fails = fails;
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn count<F: Fn(&DeviceCall) -> bool>(&self, pred: F) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| pred(c))
            .count()
    }

    /// Pipes currently allocated in the fake driver for `mixer`.
    pub fn active_pipes(&self, mixer: Mixer) -> Vec<PipeGeometry> {
        self.state
            .lock()
            .unwrap()
            .pipes
            .iter()
            .filter(|((m, _), _)| *m == mixer)
            .map(|(_, g)| *g)
            .collect()
    }

    fn record(&self, call: DeviceCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl DeviceFactory for FakeDevices {
    fn open_mdp(&self, mixer: Mixer) -> OverlayResult<Box<dyn MdpDevice>> {
        self.record(DeviceCall::OpenMdp(mixer));
        if !self.state.lock().unwrap().screens.contains_key(&mixer) {
            return Err(OverlayError::DeviceUnavailable(mixer.to_string()));
        }
        Ok(Box::new(FakeMdp {
            mixer,
            devices: self.clone(),
        }))
    }

    fn open_rotator(&self) -> OverlayResult<Box<dyn RotatorDevice>> {
        self.record(DeviceCall::OpenRotator);
        if self.state.lock().unwrap().rotator_missing {
            return Err(OverlayError::DeviceUnavailable("rotator".to_string()));
        }
        Ok(Box::new(FakeRotator {
            devices: self.clone(),
        }))
    }
}

pub struct FakeMdp {
    mixer: Mixer,
    devices: FakeDevices,
}

impl MdpDevice for FakeMdp {
    fn screen_info(&self) -> OverlayResult<ScreenInfo> {
        self.devices
            .state
            .lock()
            .unwrap()
            .screens
            .get(&self.mixer)
            .copied()
            .ok_or_else(|| OverlayError::DeviceUnavailable(self.mixer.to_string()))
    }

    fn overlay_set(&mut self, id: Option<PipeId>, geometry: &PipeGeometry) -> OverlayResult<PipeId> {
        let mut state = self.devices.state.lock().unwrap();
        let screen = state.screens.get(&self.mixer).copied().unwrap_or_default();
        let rotated = geometry.rotated_src();
        if state.reject_set.contains(&self.mixer)
            || !geometry.crop.fits_in(rotated.width, rotated.height)
            || !geometry.dst.fits_in(screen.xres, screen.yres)
        {
            return Err(OverlayError::DriverRejected {
                op: "MSMFB_OVERLAY_SET",
                reason: "rejected by fake driver".to_string(),
            });
        }
        let id = match id {
            Some(id) => {
                if !state.pipes.contains_key(&(self.mixer, id)) {
                    return Err(OverlayError::DriverRejected {
                        op: "MSMFB_OVERLAY_SET",
                        reason: format!("unknown pipe {}", id),
                    });
                }
                id
            }
            None => {
                let id = state.next_id;
                state.next_id += 1;
                id
            }
        };
        state.pipes.insert((self.mixer, id), *geometry);
        state.calls.push(DeviceCall::Set {
            mixer: self.mixer,
            id,
            geometry: *geometry,
        });
        Ok(id)
    }

    fn overlay_get(&self, id: PipeId) -> OverlayResult<PipeGeometry> {
        let mut state = self.devices.state.lock().unwrap();
        state.calls.push(DeviceCall::Get {
            mixer: self.mixer,
            id,
        });
        state
            .pipes
            .get(&(self.mixer, id))
            .copied()
            .ok_or_else(|| OverlayError::DriverRejected {
                op: "MSMFB_OVERLAY_GET",
                reason: format!("unknown pipe {}", id),
            })
    }

    fn overlay_unset(&mut self, id: PipeId) -> OverlayResult<()> {
        let mut state = self.devices.state.lock().unwrap();
        state.calls.push(DeviceCall::Unset {
            mixer: self.mixer,
            id,
        });
        state
            .pipes
            .remove(&(self.mixer, id))
            .map(|_| ())
            .ok_or_else(|| OverlayError::DriverRejected {
                op: "MSMFB_OVERLAY_UNSET",
                reason: format!("unknown pipe {}", id),
            })
    }

    fn overlay_play(&mut self, play: &PlayRequest) -> OverlayResult<()> {
        let mut state = self.devices.state.lock().unwrap();
        if !state.pipes.contains_key(&(self.mixer, play.id)) {
            return Err(OverlayError::DriverRejected {
                op: "MSMFB_OVERLAY_PLAY",
                reason: format!("unknown pipe {}", play.id),
            });
        }
        state.calls.push(DeviceCall::Play {
            mixer: self.mixer,
            id: play.id,
            fd: play.fd,
            offset: play.offset,
        });
        Ok(())
    }

    fn set_visual_param(&mut self, id: PipeId, param: VisualParam, value: i32) -> OverlayResult<()> {
        VisualParam::validate(value)?;
        self.devices.record(DeviceCall::VisualParam {
            mixer: self.mixer,
            id,
            param,
            value,
        });
        Ok(())
    }

    fn buffer_sync(&mut self, acquire_fences: &[RawFd]) -> OverlayResult<Option<RawFd>> {
        self.devices.record(DeviceCall::BufferSync {
            mixer: self.mixer,
            fences: acquire_fences.len(),
        });
        Ok(None)
    }

    fn wait_for_vsync(&mut self) -> OverlayResult<()> {
        self.devices.record(DeviceCall::WaitVsync(self.mixer));
        Ok(())
    }
}

pub struct FakeRotator {
    devices: FakeDevices,
}

impl RotatorDevice for FakeRotator {
    fn start(&mut self, info: &RotatorSessionInfo) -> OverlayResult<u32> {
        let mut state = self.devices.state.lock().unwrap();
        let session = state.next_session;
        state.next_session += 1;
        state.calls.push(DeviceCall::RotatorStart {
            session,
            info: *info,
        });
        Ok(session)
    }

    fn rotate(&mut self, job: &RotatorJob) -> OverlayResult<()> {
        self.devices.record(DeviceCall::Rotate(*job));
        Ok(())
    }

    fn finish(&mut self, session: u32) -> OverlayResult<()> {
        self.devices.record(DeviceCall::RotatorFinish(session));
        Ok(())
    }

    fn alloc_buffers(
        &mut self,
        slot_size: usize,
        count: usize,
        _secure: bool,
    ) -> OverlayResult<RotatorMemory> {
        let mut state = self.devices.state.lock().unwrap();
        state.calls.push(DeviceCall::RotatorAlloc { slot_size, count });
        if state.rotator_alloc_fails {
            return Err(OverlayError::RotatorMemory {
                size: slot_size,
                count,
            });
        }
        let handle = state.next_handle;
        state.next_handle += 1;
        Ok(RotatorMemory {
            handle,
            fd: FAKE_ROTATOR_FD + handle as RawFd,
            slot_size,
            count,
        })
    }

    fn free_buffers(&mut self, memory: &RotatorMemory) {
        self.devices.record(DeviceCall::RotatorFree(memory.handle));
    }
}
