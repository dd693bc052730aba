//! End-to-end synchronization tests against an in-process fake console.
//!
//! The fake console is a `TcpListener` on a loopback port speaking framed
//! OSC: it answers `/eos/get/.../count` and `/index/` requests from a
//! shared show description, and the tests inject notifies and events to
//! exercise the live-edit paths.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use eosync::{EosConsole, SyncState};
use rosc::{OscMessage, OscPacket, OscType};

#[derive(Clone)]
struct FakeTarget {
    id: String,
    uid: String,
    label: String,
    extra_groups: Vec<String>,
}

impl FakeTarget {
    fn new(id: &str, uid: &str, label: &str, extra_groups: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            uid: uid.to_string(),
            label: label.to_string(),
            extra_groups: extra_groups.iter().map(|g| g.to_string()).collect(),
        }
    }
}

/// Show description keyed by request base ("group", "cuelist", "cue/5", ...).
type Show = HashMap<String, Vec<FakeTarget>>;

struct FakeConsole {
    port: u16,
    show: Arc<Mutex<Show>>,
    inject_tx: mpsc::Sender<OscMessage>,
    subscribed: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FakeConsole {
    fn spawn(show: Show) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let show = Arc::new(Mutex::new(show));
        let subscribed = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));
        let (inject_tx, inject_rx) = mpsc::channel::<OscMessage>();

        let handle = {
            let show = Arc::clone(&show);
            let subscribed = Arc::clone(&subscribed);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let (stream, _) = listener.accept().unwrap();
                serve(stream, &show, &inject_rx, &subscribed, &stop);
            })
        };

        Self {
            port,
            show,
            inject_tx,
            subscribed,
            stop,
            handle: Some(handle),
        }
    }

    fn update_show(&self, f: impl FnOnce(&mut Show)) {
        f(&mut self.show.lock().unwrap());
    }

    fn inject(&self, path: &str, args: Vec<OscType>) {
        self.inject_tx
            .send(OscMessage {
                addr: path.to_string(),
                args,
            })
            .unwrap();
    }
}

impl Drop for FakeConsole {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn frame(packet: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(4 + packet.len());
    framed.extend_from_slice(&(packet.len() as i32).to_be_bytes());
    framed.extend_from_slice(packet);
    framed
}

fn send_msg(stream: &mut TcpStream, path: &str, args: Vec<OscType>) {
    let packet = rosc::encoder::encode(&OscPacket::Message(OscMessage {
        addr: path.to_string(),
        args,
    }))
    .unwrap();
    stream.write_all(&frame(&packet)).unwrap();
}

fn send_target(stream: &mut TcpStream, key: &str, target: &FakeTarget) {
    send_msg(
        stream,
        &format!("/eos/out/get/{key}/{}", target.id),
        vec![
            OscType::String(target.id.clone()),
            OscType::String(target.uid.clone()),
            OscType::String(target.label.clone()),
        ],
    );
    for group in &target.extra_groups {
        send_msg(
            stream,
            &format!("/eos/out/get/{key}/{}/{group}", target.id),
            vec![],
        );
    }
}

fn serve(
    mut stream: TcpStream,
    show: &Mutex<Show>,
    inject: &mpsc::Receiver<OscMessage>,
    subscribed: &AtomicBool,
    stop: &AtomicBool,
) {
    stream
        .set_read_timeout(Some(Duration::from_millis(20)))
        .unwrap();
    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    while !stop.load(Ordering::Relaxed) {
        while let Ok(msg) = inject.try_recv() {
            send_msg(&mut stream, &msg.addr, msg.args);
        }

        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(_) => break,
        }

        while buffer.len() >= 4 {
            let len = i32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]).max(0) as usize;
            if buffer.len() < 4 + len {
                break;
            }
            let packet: Vec<u8> = buffer.drain(..4 + len).skip(4).collect();
            if let Ok((_, OscPacket::Message(msg))) = rosc::decoder::decode_udp(&packet) {
                handle_request(&mut stream, show, subscribed, &msg);
            }
        }
    }
}

fn handle_request(stream: &mut TcpStream, show: &Mutex<Show>, subscribed: &AtomicBool, msg: &OscMessage) {
    if msg.addr == "/eos/subscribe" {
        if msg.args.first() == Some(&OscType::Bool(true)) {
            subscribed.store(true, Ordering::Relaxed);
        }
        return;
    }

    let Some(rest) = msg.addr.strip_prefix("/eos/get/") else {
        return;
    };

    let show = show.lock().unwrap();
    if let Some(key) = rest.strip_suffix("/count") {
        let count = show.get(key).map_or(0, Vec::len);
        send_msg(
            stream,
            &format!("/eos/out/get/{key}/count"),
            vec![OscType::Int(count as i32)],
        );
    } else if let Some((key, index)) = rest.split_once("/index/") {
        let index: usize = index.parse().unwrap();
        if let Some(target) = show.get(key).and_then(|targets| targets.get(index)) {
            send_target(stream, key, target);
        }
    } else if let Some((key, id)) = rest.rsplit_once('/') {
        match show
            .get(key)
            .and_then(|targets| targets.iter().find(|t| t.id == id))
        {
            Some(target) => send_target(stream, key, target),
            // a request for a target the console no longer has answers
            // with a bare id echo: no UID means deleted
            None => send_msg(
                stream,
                &format!("/eos/out/get/{key}/{id}"),
                vec![OscType::String(id.to_string())],
            ),
        }
    }
}

fn connect(console: &mut EosConsole, fake: &FakeConsole) {
    console.initialize("127.0.0.1", fake.port).unwrap();
    assert!(tick_until(console, Duration::from_secs(5), |c| c.is_connected()));
}

fn tick_until(
    console: &mut EosConsole,
    deadline: Duration,
    mut pred: impl FnMut(&EosConsole) -> bool,
) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        console.tick();
        console.drain_log();
        if pred(console) {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

fn sync_deadline() -> Duration {
    Duration::from_secs(15)
}

#[test]
fn test_cold_sync_empty_console() {
    let fake = FakeConsole::spawn(Show::new());
    let mut console = EosConsole::new();
    connect(&mut console, &fake);

    assert!(
        tick_until(&mut console, sync_deadline(), |c| c.is_synchronized()),
        "empty console must synchronize"
    );
    assert!(fake.subscribed.load(Ordering::Relaxed), "subscribe sent on connect");

    let groups = console.groups().expect("group list");
    assert_eq!(groups.status().value(), SyncState::Complete);
    assert_eq!(groups.num_targets(), 0);

    // the empty cue-list directory leaves a complete dummy cue list
    let dummy = console.cues(0).expect("dummy cue list");
    assert_eq!(dummy.status().value(), SyncState::Complete);

    console.shutdown();
    assert!(!console.is_running());
}

#[test]
fn test_cold_sync_one_group() {
    let mut show = Show::new();
    show.insert(
        "group".to_string(),
        vec![FakeTarget::new("1", "abc", "cyc", &["channels"])],
    );
    let fake = FakeConsole::spawn(show);
    let mut console = EosConsole::new();
    connect(&mut console, &fake);

    assert!(tick_until(&mut console, sync_deadline(), |c| c.is_synchronized()));

    let groups = console.groups().unwrap();
    assert_eq!(groups.num_targets(), 1);

    let num = "1".parse().unwrap();
    let target = groups.target(num, 0).expect("target (1,0)");
    assert_eq!(target.status().value(), SyncState::Complete);

    let general = target.group("").unwrap();
    assert_eq!(general.props.len(), 3);
    assert_eq!(general.props[2].value, "cyc");

    let by_uid = groups.target_by_uid("abc").expect("uid lookup");
    assert!(std::ptr::eq(by_uid, target));
}

#[test]
fn test_cue_list_discovery() {
    let mut show = Show::new();
    show.insert(
        "cuelist".to_string(),
        vec![FakeTarget::new("5", "cl-5", "Main", &["links"])],
    );
    show.insert(
        "cue/5".to_string(),
        vec![
            FakeTarget::new("1", "q-1", "Opening", &["fx", "links", "actions"]),
            FakeTarget::new("2.5", "q-2.5", "Blackout", &["fx", "links", "actions"]),
        ],
    );
    let fake = FakeConsole::spawn(show);
    let mut console = EosConsole::new();
    connect(&mut console, &fake);

    assert!(tick_until(&mut console, sync_deadline(), |c| c.is_synchronized()));

    let cues = console.cues(5).expect("cue list 5 discovered");
    assert_eq!(cues.list_id(), 5);
    assert_eq!(cues.num_targets(), 2);
    assert!(cues.target("2.5".parse().unwrap(), 0).is_some());
    assert!(console.cues(0).is_none(), "no dummy when real cue lists exist");
}

#[test]
fn test_live_add_via_notify() {
    let mut show = Show::new();
    show.insert(
        "group".to_string(),
        vec![FakeTarget::new("1", "abc", "cyc", &["channels"])],
    );
    let fake = FakeConsole::spawn(show);
    let mut console = EosConsole::new();
    connect(&mut console, &fake);
    assert!(tick_until(&mut console, sync_deadline(), |c| c.is_synchronized()));

    fake.update_show(|show| {
        show.get_mut("group")
            .unwrap()
            .push(FakeTarget::new("7", "ghj", "spots", &["channels"]));
    });
    fake.inject(
        "/eos/out/notify/group",
        vec![OscType::Int(42), OscType::String("7".into())],
    );

    // the notify demotes the mirror, the placeholder gets re-requested,
    // and the mirror converges on the new state
    assert!(tick_until(&mut console, sync_deadline(), |c| {
        c.is_synchronized() && c.groups().is_some_and(|g| g.num_targets() == 2)
    }));

    let groups = console.groups().unwrap();
    let target = groups.target("7".parse().unwrap(), 0).expect("added group");
    assert_eq!(target.status().value(), SyncState::Complete);
    assert_eq!(target.group("").unwrap().props[2].value, "spots");
    assert!(groups.target_by_uid("ghj").is_some());
}

#[test]
fn test_live_delete_via_notify() {
    let mut show = Show::new();
    show.insert(
        "group".to_string(),
        vec![
            FakeTarget::new("1", "abc", "cyc", &["channels"]),
            FakeTarget::new("2", "def", "truss", &["channels"]),
        ],
    );
    let fake = FakeConsole::spawn(show);
    let mut console = EosConsole::new();
    connect(&mut console, &fake);
    assert!(tick_until(&mut console, sync_deadline(), |c| c.is_synchronized()));
    console.clear_dirty();

    // group 1 is deleted on the console: the re-request after the notify
    // comes back without a UID
    fake.update_show(|show| {
        show.get_mut("group").unwrap().retain(|t| t.id != "1");
    });
    fake.inject(
        "/eos/out/notify/group",
        vec![OscType::Int(43), OscType::String("1".into())],
    );

    assert!(tick_until(&mut console, sync_deadline(), |c| {
        c.is_synchronized() && c.groups().is_some_and(|g| g.num_targets() == 1)
    }));

    let groups = console.groups().unwrap();
    assert!(groups.target("1".parse().unwrap(), 0).is_none());
    assert!(groups.target_by_uid("abc").is_none(), "uid index cleaned");
    assert!(groups.target_by_uid("def").is_some());
    assert!(groups.status().dirty(), "deletion leaves the list dirty");
}

#[test]
fn test_show_cleared_resets_and_resyncs() {
    let mut show = Show::new();
    show.insert(
        "macro".to_string(),
        vec![FakeTarget::new("3", "m-3", "houselights", &["text"])],
    );
    let fake = FakeConsole::spawn(show);
    let mut console = EosConsole::new();
    connect(&mut console, &fake);
    assert!(tick_until(&mut console, sync_deadline(), |c| c.is_synchronized()));

    fake.inject("/eos/out/event/show/cleared", vec![]);

    // the event tears the mirror down...
    assert!(tick_until(&mut console, sync_deadline(), |c| !c.is_synchronized()));

    // ...and the tick loop rebuilds it from scratch
    assert!(tick_until(&mut console, sync_deadline(), |c| {
        c.is_synchronized() && c.macros().is_some_and(|m| m.num_targets() == 1)
    }));
}
