use super::*;
use crate::tui::driver::{Tty, WinSizeError};
use crate::tui::ports::{InputEvent, SessionEvent};
use crate::tui::pty::{open_pty_pair, PtyDriver, PtyRemote};
use std::io::Read;
use std::os::fd::AsRawFd;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(3);

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<SessionEvent>>>);

impl Recorder {
    fn events(&self) -> Vec<SessionEvent> {
        self.0.lock().clone()
    }

    fn resizes(&self) -> Vec<Size> {
        self.events()
            .into_iter()
            .filter_map(|ev| match ev {
                SessionEvent::Resize(size) => Some(size),
                _ => None,
            })
            .collect()
    }

    fn input_bytes(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|ev| match ev {
                SessionEvent::Input(InputEvent::Bytes(bytes)) => Some(bytes),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

impl EventHandler for Recorder {
    fn handle(&mut self, event: SessionEvent) {
        self.0.lock().push(event);
    }
}

#[derive(Clone, Default)]
struct CellLog(Arc<Mutex<Vec<Size>>>);

impl CellBuffer for CellLog {
    fn resize(&mut self, size: Size) {
        self.0.lock().push(size);
    }
}

#[derive(Clone, Default)]
struct CountingDecoder(Arc<AtomicUsize>);

impl InputDecoder for CountingDecoder {
    fn decode(&mut self, bytes: &[u8], out: &mut Vec<InputEvent>) {
        self.0.fetch_add(bytes.len(), Ordering::SeqCst);
        RawDecoder.decode(bytes, out);
    }
}

struct Harness {
    session: Session,
    remote: PtyRemote,
    master: File,
    events: Recorder,
    cells: CellLog,
    decoded: Arc<AtomicUsize>,
}

fn harness_with(config: SessionConfig) -> Harness {
    let (driver, remote) = PtyDriver::open("xterm-256color", Size::new(80, 24)).unwrap();
    let master = remote.try_clone_master().unwrap();
    set_nonblocking(&master);

    let events = Recorder::default();
    let cells = CellLog::default();
    let decoder = CountingDecoder::default();
    let decoded = Arc::clone(&decoder.0);
    let session = Session::new(driver, config)
        .with_handler(events.clone())
        .with_cells(cells.clone())
        .with_decoder(decoder);

    Harness {
        session,
        remote,
        master,
        events,
        cells,
        decoded,
    }
}

fn harness() -> Harness {
    harness_with(SessionConfig::default())
}

fn set_nonblocking(file: &File) {
    unsafe {
        let fd = file.as_raw_fd();
        let flags = libc::fcntl(fd, libc::F_GETFL);
        assert!(flags >= 0);
        assert!(libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) >= 0);
    }
}

fn drain(master: &File) -> Vec<u8> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match (&*master).read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&chunk[..n]),
            Err(_) => break,
        }
    }
    out
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < WAIT {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn read_until(master: &File, needle: &str) -> Vec<u8> {
    let mut out = Vec::new();
    wait_until(|| {
        out.extend(drain(master));
        contains(&out, needle)
    });
    out
}

fn contains(haystack: &[u8], needle: &str) -> bool {
    haystack
        .windows(needle.len())
        .any(|w| w == needle.as_bytes())
}

fn current_attrs(h: &Harness) -> SavedAttributes {
    let bound = h.session.bound.get().unwrap();
    SavedAttributes::capture(&*bound.input).unwrap()
}

#[test]
fn second_engage_reports_already_engaged() {
    let h = harness();
    h.session.engage().unwrap();
    let first = h.session.stop_id().unwrap();

    let err = h.session.engage().unwrap_err();
    assert!(matches!(err, SessionError::AlreadyEngaged));
    assert!(h.session.is_engaged());
    assert_eq!(h.session.stop_id(), Some(first));
    assert_eq!(h.session.loops_running(), 2);

    h.session.disengage();
}

#[test]
fn engage_disengage_round_trips_attributes() {
    let h = harness();
    h.session.initialize().unwrap();
    let saved = h.session.saved_attributes().unwrap();
    assert!(!saved.is_raw());

    h.session.engage().unwrap();
    assert!(current_attrs(&h).is_raw());

    h.session.disengage();
    assert!(current_attrs(&h).same_as(&saved));
    assert!(!h.session.is_engaged());
}

#[test]
fn disengage_returns_after_both_loops_stop() {
    let mut h = harness();
    h.session.engage().unwrap();
    assert_eq!(h.session.loops_running(), 2);

    use std::io::Write;
    h.remote.write_all(b"abc").unwrap();
    assert!(wait_until(|| h.events.input_bytes() == b"abc"));

    h.session.disengage();
    assert_eq!(h.session.loops_running(), 0);

    let decoded = h.decoded.load(Ordering::SeqCst);
    let seen = h.events.events().len();
    h.remote.write_all(b"more").unwrap();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(h.decoded.load(Ordering::SeqCst), decoded);
    assert_eq!(h.events.events().len(), seen);
}

#[test]
fn resize_applies_once_and_ignores_zero() {
    let h = harness();
    h.session.engage().unwrap();
    assert_eq!(h.session.size(), Size::new(80, 24));

    h.remote.resize(Size::new(120, 40)).unwrap();
    assert!(wait_until(|| h.events.resizes() == vec![Size::new(120, 40)]));
    assert_eq!(h.session.size(), Size::new(120, 40));
    assert_eq!(h.cells.0.lock().last(), Some(&Size::new(120, 40)));

    h.remote.resize(Size::ZERO).unwrap();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(h.events.resizes().len(), 1);
    assert_eq!(h.session.size(), Size::new(120, 40));

    h.session.disengage();
    assert_eq!(h.cells.0.lock().last(), Some(&Size::ZERO));
}

#[test]
fn engage_with_zero_size_leaves_cells_alone() {
    let (driver, _remote) = PtyDriver::open("xterm", Size::ZERO).unwrap();
    let cells = CellLog::default();
    let session = Session::new(driver, SessionConfig::default()).with_cells(cells.clone());

    session.engage().unwrap();
    assert!(cells.0.lock().is_empty());
    assert_eq!(session.size(), Size::ZERO);
    session.disengage();
}

#[test]
fn beep_writes_a_single_bell() {
    let h = harness();
    h.session.initialize().unwrap();
    h.session.beep().unwrap();

    let mut out = Vec::new();
    assert!(wait_until(|| {
        out.extend(drain(&h.master));
        !out.is_empty()
    }));
    assert_eq!(out, vec![7]);
}

#[test]
fn beep_before_initialize_still_succeeds() {
    let h = harness();
    assert!(h.session.beep().is_ok());
}

#[test]
fn reengage_uses_a_fresh_stop_signal() {
    let mut h = harness();
    h.session.engage().unwrap();
    let first = h.session.stop_id().unwrap();
    h.session.disengage();
    assert_eq!(h.session.stop_id(), None);

    h.session.engage().unwrap();
    let second = h.session.stop_id().unwrap();
    assert_ne!(first, second);
    assert_eq!(h.session.loops_running(), 2);

    use std::io::Write;
    h.remote.write_all(b"x").unwrap();
    assert!(wait_until(|| h.events.input_bytes() == b"x"));

    h.session.suspend();
    h.session.resume().unwrap();
    assert_ne!(h.session.stop_id(), Some(second));
    h.session.disengage();
}

#[test]
fn enter_and_exit_sequences_bracket_the_session() {
    let h = harness();
    h.session.engage().unwrap();
    let entered = read_until(&h.master, "\x1b[2J");
    assert!(contains(&entered, "\x1b[?1049h"));
    assert!(contains(&entered, "\x1b[?25l"));
    assert!(!contains(&entered, "\x1b[?1049l"));

    h.session.disengage();
    let exited = read_until(&h.master, "\x1b[?1006l");
    assert!(contains(&exited, "\x1b[?25h"));
    assert!(contains(&exited, "\x1b[?1049l"));
    assert!(contains(&exited, "\x1b[?1000l"));
}

#[test]
fn disengage_without_engage_is_a_no_op() {
    let h = harness();
    h.session.disengage();
    h.session.initialize().unwrap();
    h.session.disengage();
    assert!(!h.session.is_engaged());
    assert!(drain(&h.master).is_empty());
}

#[test]
fn mouse_and_paste_follow_config_and_runtime_toggles() {
    let h = harness_with(SessionConfig {
        mouse: MouseMode::Buttons,
        bracketed_paste: true,
        ..SessionConfig::default()
    });
    h.session.engage().unwrap();
    let entered = read_until(&h.master, "\x1b[2J");
    assert!(contains(&entered, "\x1b[?1000h"));
    assert!(contains(&entered, "\x1b[?2004h"));

    h.session.enable_mouse(MouseMode::Motion);
    assert!(contains(&read_until(&h.master, "\x1b[?1003h"), "\x1b[?1003h"));

    h.session.disable_paste();
    assert!(contains(&read_until(&h.master, "\x1b[?2004l"), "\x1b[?2004l"));
    h.session.disengage();
    read_until(&h.master, "\x1b[?1049l");

    h.session.enable_mouse(MouseMode::Drag);
    std::thread::sleep(Duration::from_millis(50));
    assert!(!contains(&drain(&h.master), "\x1b[?1002h"));
}

#[test]
fn hangup_is_reported_as_input_closed() {
    let Harness {
        session,
        remote,
        master,
        events,
        ..
    } = harness();
    session.engage().unwrap();

    drop(remote);
    drop(master);
    assert!(wait_until(|| events.events().contains(&SessionEvent::InputClosed)));
    assert!(wait_until(|| session.loops_running() == 1));
    assert!(session.is_engaged());

    session.disengage();
    assert_eq!(session.loops_running(), 0);
}

struct SlowDecoder {
    entered: Arc<AtomicBool>,
}

impl InputDecoder for SlowDecoder {
    fn decode(&mut self, _bytes: &[u8], _out: &mut Vec<InputEvent>) {
        self.entered.store(true, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(1500));
    }
}

#[test]
fn bounded_shutdown_detaches_a_stuck_loop() {
    let (driver, mut remote) = PtyDriver::open("xterm", Size::new(80, 24)).unwrap();
    let entered = Arc::new(AtomicBool::new(false));
    let session = Session::new(
        driver,
        SessionConfig {
            shutdown_timeout_ms: Some(50),
            ..SessionConfig::default()
        },
    )
    .with_decoder(SlowDecoder {
        entered: Arc::clone(&entered),
    });
    session.engage().unwrap();

    use std::io::Write;
    remote.write_all(b"z").unwrap();
    assert!(wait_until(|| entered.load(Ordering::SeqCst)));

    let start = Instant::now();
    session.disengage();
    assert!(start.elapsed() < Duration::from_millis(1000));
    assert!(!session.is_engaged());
    assert!(wait_until(|| session.loops_running() == 0));
}

struct FailingDriver;

impl TermDriver for FailingDriver {
    fn init(&self, _resize: ResizeSender) -> io::Result<Tty> {
        Err(io::Error::new(io::ErrorKind::NotFound, "no tty"))
    }

    fn term(&self) -> String {
        "xterm".into()
    }

    fn engage(&self) {
        panic!("engage must not run after a failed init");
    }

    fn disengage(&self) {}
}

#[test]
fn driver_init_failure_is_fatal_to_engage() {
    let session = Session::new(FailingDriver, SessionConfig::default());
    let err = session.engage().unwrap_err();
    assert!(matches!(err, SessionError::DriverInit(_)));
    assert!(!session.is_engaged());
    assert_eq!(session.loops_running(), 0);
}

struct FileDriver;

impl TermDriver for FileDriver {
    fn init(&self, _resize: ResizeSender) -> io::Result<Tty> {
        Ok(Tty {
            input: tempfile::tempfile()?,
            output: tempfile::tempfile()?,
        })
    }

    fn win_size(&self) -> Result<Size, WinSizeError> {
        Err(WinSizeError::Unsupported)
    }

    fn term(&self) -> String {
        "xterm".into()
    }

    fn engage(&self) {}

    fn disengage(&self) {}
}

#[test]
fn non_tty_handles_fail_before_any_side_effect() {
    let session = Session::new(FileDriver, SessionConfig::default());
    let err = session.engage().unwrap_err();
    assert!(matches!(err, SessionError::Attributes(_)));
    assert!(!session.is_engaged());
}

#[test]
fn config_term_overrides_driver_and_selects_capabilities() {
    let (driver, _remote) = PtyDriver::open("xterm", Size::new(80, 24)).unwrap();
    let session = Session::new(
        driver,
        SessionConfig {
            term: Some("dumb".into()),
            ..SessionConfig::default()
        },
    );
    session.initialize().unwrap();
    assert_eq!(session.term(), Some("dumb"));
    assert!(session
        .bound
        .get()
        .unwrap()
        .caps
        .get(Capability::EnterCa)
        .is_none());
}

#[derive(Default)]
struct CountingFileDriver {
    inits: AtomicUsize,
}

impl TermDriver for CountingFileDriver {
    fn init(&self, _resize: ResizeSender) -> io::Result<Tty> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(Tty {
            input: tempfile::tempfile()?,
            output: tempfile::tempfile()?,
        })
    }

    fn term(&self) -> String {
        "xterm".into()
    }

    fn engage(&self) {}

    fn disengage(&self) {}
}

#[test]
fn failed_capture_keeps_the_driver_handles() {
    let driver = Arc::new(CountingFileDriver::default());
    let session = Session::with_driver(
        Arc::clone(&driver) as Arc<dyn TermDriver>,
        SessionConfig::default(),
    );

    assert!(matches!(
        session.initialize(),
        Err(SessionError::Attributes(_))
    ));
    assert!(matches!(session.engage(), Err(SessionError::Attributes(_))));
    assert_eq!(driver.inits.load(Ordering::SeqCst), 1);
    assert!(session.saved_attributes().is_none());
}

struct HandoffDriver {
    tty: Mutex<Option<Tty>>,
}

impl TermDriver for HandoffDriver {
    fn init(&self, _resize: ResizeSender) -> io::Result<Tty> {
        self.tty
            .lock()
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::AlreadyExists, "tty already bound"))
    }

    fn term(&self) -> String {
        "xterm".into()
    }

    fn engage(&self) {
        panic!("engage must not run after raw mode failed");
    }

    fn disengage(&self) {}
}

#[cfg(target_os = "linux")]
#[test]
fn raw_mode_failure_starts_nothing_and_writes_nothing() {
    let (master, slave) = open_pty_pair().unwrap();
    let output = tempfile::tempfile().unwrap();
    let written = output.try_clone().unwrap();
    let session = Session::new(
        HandoffDriver {
            tty: Mutex::new(Some(Tty {
                input: slave,
                output,
            })),
        },
        SessionConfig {
            mouse: MouseMode::Buttons,
            bracketed_paste: true,
            ..SessionConfig::default()
        },
    );
    session.initialize().unwrap();

    // Closing the master hangs up the slave; termios calls on it fail from here on.
    drop(master);

    let err = session.engage().unwrap_err();
    assert!(matches!(err, SessionError::RawMode(_)));
    assert!(!session.is_engaged());
    assert_eq!(session.stop_id(), None);
    assert_eq!(session.loops_running(), 0);
    assert_eq!(written.metadata().unwrap().len(), 0);
}

#[test]
fn mouse_toggle_racing_engage_reaches_the_terminal() {
    for _ in 0..50 {
        let h = harness();
        let session = &h.session;
        std::thread::scope(|s| {
            s.spawn(move || session.engage().unwrap());
            s.spawn(move || session.enable_mouse(MouseMode::Motion));
        });

        assert!(h.session.is_engaged());
        assert_eq!(h.session.state.lock().mouse, MouseMode::Motion);
        let out = read_until(&h.master, "\x1b[?1003h");
        assert!(contains(&out, "\x1b[?1003h"));
        h.session.disengage();
    }
}

#[test]
fn paste_toggle_racing_engage_reaches_the_terminal() {
    for _ in 0..50 {
        let h = harness();
        let session = &h.session;
        std::thread::scope(|s| {
            s.spawn(move || session.engage().unwrap());
            s.spawn(move || session.enable_paste());
        });

        assert!(h.session.state.lock().paste);
        let out = read_until(&h.master, "\x1b[?2004h");
        assert!(contains(&out, "\x1b[?2004h"));
        h.session.disengage();
    }
}
