//! uevent: the hotplug listener. Kernel uevents for the HDMI switch are turned into connect
//! and disconnect calls on the shared `ExternalDisplay`; a change that lands while a frame is
//! being configured is staged there until the next frame starts.

use std::os::unix::io::AsRawFd;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use nix::errno::Errno;
use nix::poll::poll;
use nix::poll::PollFd;
use nix::poll::PollFlags;
use nix::sys::socket::bind;
use nix::sys::socket::recv;
use nix::sys::socket::socket;
use nix::sys::socket::AddressFamily;
use nix::sys::socket::MsgFlags;
use nix::sys::socket::NetlinkAddr;
use nix::sys::socket::SockFlag;
use nix::sys::socket::SockProtocol;
use nix::sys::socket::SockType;
use nix::unistd::close;
use vmm_sys_util::eventfd::EventFd;
use vmm_sys_util::eventfd::EFD_NONBLOCK;

use crate::external::ExternalDisplay;
use crate::hwc_utils::*;

const HOTPLUG_THREAD_NAME: &str = "hwc-hotplug";

/// Largest uevent the kernel sends.
const UEVENT_BUFFER_SIZE: usize = 2048;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HotplugEvent {
    Connected,
    Disconnected,
}

/// Parses one raw uevent: NUL separated `KEY=VALUE` fields after a `change@<devpath>`
/// header. Only changes of an HDMI switch carrying `SWITCH_STATE` are hotplug events.
pub fn parse_uevent(raw: &[u8]) -> Option<HotplugEvent> {
    let mut fields = raw
        .split(|b| *b == 0)
        .filter(|f| !f.is_empty())
        .map(String::from_utf8_lossy);
    let header = fields.next()?;
    let devpath = header.strip_prefix("change@")?;
    if !devpath.contains("hdmi") {
        return None;
    }
    fields.find_map(|f| match f.strip_prefix("SWITCH_STATE=") {
        Some("0") => Some(HotplugEvent::Disconnected),
        Some("1") => Some(HotplugEvent::Connected),
        _ => None,
    })
}

/// Somewhere raw uevents are read from.
pub trait UeventSource: Send {
    fn raw_fd(&self) -> RawFd;

    /// Reads one event into `buf`, returning its length.
    fn recv_event(&mut self, buf: &mut [u8]) -> HwcResult<usize>;
}

/// The kernel's kobject uevent netlink broadcast.
pub struct NetlinkUevents {
    fd: RawFd,
}

impl NetlinkUevents {
    pub fn open() -> HwcResult<NetlinkUevents> {
        let fd = socket(
            AddressFamily::Netlink,
            SockType::Datagram,
            SockFlag::SOCK_CLOEXEC,
            SockProtocol::NetlinkKObjectUEvent,
        )?;
        let uevents = NetlinkUevents { fd };
        bind(fd, &NetlinkAddr::new(0, 1))?;
        Ok(uevents)
    }
}

impl UeventSource for NetlinkUevents {
    fn raw_fd(&self) -> RawFd {
        self.fd
    }

    fn recv_event(&mut self, buf: &mut [u8]) -> HwcResult<usize> {
        Ok(recv(self.fd, buf, MsgFlags::empty())?)
    }
}

impl Drop for NetlinkUevents {
    fn drop(&mut self) {
        if let Err(e) = close(self.fd) {
            warn!("hotplug: failed to close uevent socket: {}", e);
        }
    }
}

/// Handle on the running hotplug thread. Dropping it stops the thread.
pub struct HotplugListener {
    stop: EventFd,
    handle: Option<JoinHandle<()>>,
}

impl HotplugListener {
    /// Starts applying hotplug events from `source` to `external`. Every applied or staged
    /// event is also sent to `notify`, if given.
    pub fn spawn(
        source: Box<dyn UeventSource>,
        external: Arc<ExternalDisplay>,
        notify: Option<Sender<HotplugEvent>>,
    ) -> HwcResult<HotplugListener> {
        let stop = EventFd::new(EFD_NONBLOCK).map_err(HwcError::EventFd)?;
        let thread_stop = stop.try_clone().map_err(HwcError::EventFd)?;
        let handle = thread::Builder::new()
            .name(HOTPLUG_THREAD_NAME.to_string())
            .spawn(move || run(source, thread_stop, external, notify))
            .map_err(|err| HwcError::SpawnThread {
                name: HOTPLUG_THREAD_NAME,
                err,
            })?;
        Ok(HotplugListener {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => return,
        };
        if let Err(e) = self.stop.write(1) {
            error!("hotplug: failed to signal stop: {}", e);
            return;
        }
        if handle.join().is_err() {
            error!("hotplug: thread panicked");
        }
    }
}

impl Drop for HotplugListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    mut source: Box<dyn UeventSource>,
    stop: EventFd,
    external: Arc<ExternalDisplay>,
    notify: Option<Sender<HotplugEvent>>,
) {
    let mut buf = [0u8; UEVENT_BUFFER_SIZE];
    loop {
        let mut fds = [
            PollFd::new(source.raw_fd(), PollFlags::POLLIN),
            PollFd::new(stop.as_raw_fd(), PollFlags::POLLIN),
        ];
        match poll(&mut fds, -1) {
            Ok(_) => {}
            Err(Errno::EINTR) => continue,
            Err(e) => {
                error!("hotplug: poll failed: {}", e);
                return;
            }
        }
        if fds[1].revents().map_or(false, |r| r.contains(PollFlags::POLLIN)) {
            debug!("hotplug: stopping");
            return;
        }
        let revents = fds[0].revents().unwrap_or_else(PollFlags::empty);
        if !revents.contains(PollFlags::POLLIN) {
            if revents.intersects(PollFlags::POLLHUP | PollFlags::POLLNVAL) {
                warn!("hotplug: uevent source closed");
                return;
            }
            continue;
        }
        let len = match source.recv_event(&mut buf) {
            Ok(0) => {
                warn!("hotplug: uevent source closed");
                return;
            }
            Ok(len) => len,
            Err(e) => {
                error!("hotplug: failed to read uevent: {}", e);
                return;
            }
        };
        let event = match parse_uevent(&buf[..len]) {
            Some(event) => event,
            None => continue,
        };
        let applied = external.handle_hotplug(event == HotplugEvent::Connected);
        info!(
            "hotplug: {:?}{}",
            event,
            if applied { "" } else { " (staged)" }
        );
        if let Some(notify) = &notify {
            if notify.send(event).is_err() {
                debug!("hotplug: listener gone");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Read;
    use std::io::Write;
    use std::os::unix::io::FromRawFd;
    use std::time::Duration;

    use crossbeam_channel::unbounded;

    use super::*;

    struct PipeUevents {
        file: File,
    }

    impl UeventSource for PipeUevents {
        fn raw_fd(&self) -> RawFd {
            self.file.as_raw_fd()
        }

        fn recv_event(&mut self, buf: &mut [u8]) -> HwcResult<usize> {
            Ok(self.file.read(buf)?)
        }
    }

    const HDMI_ON: &[u8] =
        b"change@/devices/virtual/switch/hdmi\0ACTION=change\0SWITCH_NAME=hdmi\0SWITCH_STATE=1\0";
    const HDMI_OFF: &[u8] =
        b"change@/devices/virtual/switch/hdmi\0ACTION=change\0SWITCH_NAME=hdmi\0SWITCH_STATE=0\0";

    #[test]
    fn parses_hdmi_switch_events() {
        assert_eq!(parse_uevent(HDMI_ON), Some(HotplugEvent::Connected));
        assert_eq!(parse_uevent(HDMI_OFF), Some(HotplugEvent::Disconnected));
        assert_eq!(
            parse_uevent(b"add@/devices/virtual/switch/hdmi\0SWITCH_STATE=1\0"),
            None
        );
        assert_eq!(
            parse_uevent(b"change@/devices/virtual/switch/h2w\0SWITCH_STATE=1\0"),
            None
        );
        assert_eq!(parse_uevent(b"change@/devices/virtual/switch/hdmi\0"), None);
        assert_eq!(parse_uevent(b""), None);
    }

    #[test]
    fn events_reach_the_external_display() {
        let (read_fd, write_fd) = nix::unistd::pipe().unwrap();
        // SAFETY: both descriptors were just created and are owned by nothing else.
        let (read, mut write) =
            unsafe { (File::from_raw_fd(read_fd), File::from_raw_fd(write_fd)) };
        let external = Arc::new(ExternalDisplay::new("/nonexistent", None, false));
        let (tx, rx) = unbounded();
        let mut listener = HotplugListener::spawn(
            Box::new(PipeUevents { file: read }),
            external.clone(),
            Some(tx),
        )
        .unwrap();

        write.write_all(HDMI_ON).unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)),
            Ok(HotplugEvent::Connected)
        );
        assert!(external.is_connected());

        external.set_configuring(true);
        write.write_all(HDMI_OFF).unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)),
            Ok(HotplugEvent::Disconnected)
        );
        assert!(external.is_connected());
        external.set_configuring(false);
        assert_eq!(external.apply_staged(), Some(false));
        assert!(!external.is_connected());

        listener.stop();
    }
}
