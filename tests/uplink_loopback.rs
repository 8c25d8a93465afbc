//! Drive the uplink loop against a fake hub on a loopback socket.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use slsvcd::config::Config;
use slsvcd::event::Event;
use slsvcd::sync::Uplink;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::timeout;

const LIMIT: Duration = Duration::from_secs(15);

fn uplink_block(port: u16, receive_password: &str, priority: u32) -> String {
    format!(
        r#"
[[uplinks]]
name = "hub.malkier.net"
host = "127.0.0.1"
port = {port}
send_password = "linkage"
receive_password = "{receive_password}"
protocol = "ts6"
priority = {priority}
"#
    )
}

fn config_with(uplinks: &str) -> Config {
    let toml = format!(
        r##"
[server]
name = "services.malkier.net"
description = "Services"
sid = "0SV"

[connection]
reconnect_delay_secs = 1

[status]
channel = "#malkier"
{uplinks}
"##
    );
    toml::from_str(&toml).unwrap()
}

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

struct Peer {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl Peer {
    async fn accept(listener: &TcpListener) -> Self {
        let (sock, _): (TcpStream, _) = listener.accept().await.unwrap();
        let (read, writer) = sock.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    async fn read(&mut self) -> Option<String> {
        self.lines.next_line().await.ok().flatten()
    }

    async fn read_n(&mut self, n: usize) -> Vec<String> {
        let mut out = Vec::new();
        while out.len() < n {
            match self.read().await {
                Some(line) => out.push(line),
                None => break,
            }
        }
        out
    }

    async fn read_until(&mut self, needle: &str) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(line) = self.read().await {
            let done = line.contains(needle);
            out.push(line);
            if done {
                break;
            }
        }
        out
    }

    async fn send(&mut self, lines: &[String]) {
        // The far side may hang up mid-burst; that is for the test to notice.
        for line in lines {
            if self
                .writer
                .write_all(format!("{line}\r\n").as_bytes())
                .await
                .is_err()
            {
                break;
            }
        }
    }
}

fn hub_burst(now: i64, password: &str) -> Vec<String> {
    vec![
        format!("PASS {password} TS 6 :0AA"),
        "CAPAB :QS EX IE KLN UNKLN ENCAP TB SERVICES EUID".to_string(),
        "SERVER hub.malkier.net 1 :Hub".to_string(),
        format!("SVINFO 6 6 0 :{now}"),
        format!(
            ":0AA UID rakaur 1 {now} +io rakaur malkier.net 69.162.167.45 0AAAAAAAA :Eric Will"
        ),
        format!(":0AA SJOIN {now} #malkier +nt :@0AAAAAAAA"),
        "PING :hub.malkier.net".to_string(),
    ]
}

fn disconnect_log(uplink: &mut Uplink) -> Rc<RefCell<Vec<String>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    uplink
        .dispatcher_mut()
        .handle_persistent("disconnected", move |_, ev| {
            if let Event::Disconnected { reason } = ev {
                sink.borrow_mut().push(reason.clone());
            }
        });
    log
}

#[tokio::test]
async fn ts6_link_bursts_and_status_joins() {
    let (listener, port) = listener().await;
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let mut uplink = Uplink::new(config_with(&uplink_block(port, "linkage", 0)));
    let disconnects = disconnect_log(&mut uplink);

    let hub = async move {
        let mut peer = Peer::accept(&listener).await;
        let mut seen = peer.read_n(4).await;
        let now = chrono::Utc::now().timestamp();
        peer.send(&hub_burst(now, "linkage")).await;

        // The op arrives through the mode stacker's timer.
        seen.extend(peer.read_until(" TMODE ").await);
        shutdown_tx.send(()).unwrap();
        while let Some(line) = peer.read().await {
            seen.push(line);
        }
        (now, seen)
    };

    let ((now, seen), ()) = timeout(LIMIT, async { tokio::join!(hub, uplink.run(shutdown_rx)) })
        .await
        .unwrap();

    assert_eq!(seen[0], "PASS linkage TS 6 :0SV");
    assert!(seen[2].starts_with("SERVER services.malkier.net 1 "));
    assert!(seen.iter().any(|l| l.starts_with(":0SV UID Status 1 ")));
    assert!(
        seen.iter()
            .any(|l| l == ":0SV PONG services.malkier.net :hub.malkier.net")
    );
    assert!(
        seen.iter()
            .any(|l| *l == format!(":0SVAAAAAA JOIN {now} #malkier +"))
    );
    assert!(
        seen.iter()
            .any(|l| l.starts_with(":0SVAAAAAA PRIVMSG #malkier :Synced with hub.malkier.net"))
    );
    assert!(
        seen.iter()
            .any(|l| *l == format!(":0SV TMODE {now} #malkier +o 0SVAAAAAA"))
    );
    assert_eq!(
        seen.last().map(String::as_str),
        Some(":0SVAAAAAA QUIT :Shutting down")
    );
    assert_eq!(*disconnects.borrow(), vec!["Shutting down".to_string()]);
}

#[tokio::test]
async fn bad_password_drops_and_reconnects() {
    let (listener, port) = listener().await;
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let mut uplink = Uplink::new(config_with(&uplink_block(port, "sekrit", 0)));
    let disconnects = disconnect_log(&mut uplink);

    let hub = async move {
        let mut first = Peer::accept(&listener).await;
        first.read_n(4).await;
        let now = chrono::Utc::now().timestamp();
        first.send(&hub_burst(now, "linkage")).await;
        // Nothing but the close follows a refused password.
        let mut after = Vec::new();
        while let Some(line) = first.read().await {
            after.push(line);
        }

        let mut second = Peer::accept(&listener).await;
        let greeting = second.read_n(1).await;
        shutdown_tx.send(()).unwrap();
        while second.read().await.is_some() {}
        (after, greeting)
    };

    let ((after, greeting), ()) =
        timeout(LIMIT, async { tokio::join!(hub, uplink.run(shutdown_rx)) })
            .await
            .unwrap();

    assert!(after.is_empty(), "unexpected lines: {after:?}");
    assert_eq!(greeting, vec!["PASS linkage TS 6 :0SV".to_string()]);
    assert_eq!(
        *disconnects.borrow(),
        vec![
            "password mismatch from uplink".to_string(),
            "Shutting down".to_string()
        ]
    );
}

#[tokio::test]
async fn unreachable_uplink_falls_through_to_the_next() {
    // A port nobody listens on.
    let dead_port = {
        let (dead, port) = listener().await;
        drop(dead);
        port
    };
    let (listener, port) = listener().await;
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let uplinks = format!(
        "{}{}",
        uplink_block(port, "linkage", 10),
        uplink_block(dead_port, "linkage", 1)
    );
    let mut uplink = Uplink::new(config_with(&uplinks));
    let disconnects = disconnect_log(&mut uplink);

    let hub = async move {
        let mut peer = Peer::accept(&listener).await;
        let greeting = peer.read_n(1).await;
        shutdown_tx.send(()).unwrap();
        while peer.read().await.is_some() {}
        greeting
    };

    let (greeting, ()) = timeout(LIMIT, async { tokio::join!(hub, uplink.run(shutdown_rx)) })
        .await
        .unwrap();

    assert_eq!(greeting, vec!["PASS linkage TS 6 :0SV".to_string()]);
    // The refused connect never reached the transport, so only the live
    // link reports a disconnect.
    assert_eq!(*disconnects.borrow(), vec!["Shutting down".to_string()]);
}
