use std::io::Read;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use tracing::{info, warn};

use crate::cli::LineFormat;
use crate::ingest::{parse_line, Ping};
use crate::state::SharedState;

/// Longest feeder line accepted; longer lines are dropped whole.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Everything a feeder connection needs besides its socket.
#[derive(Clone)]
pub struct FeedSink {
    pub format: LineFormat,
    pub pings: Sender<Ping>,
    pub status: Sender<String>,
    pub shared: Arc<SharedState>,
    pub stop: Arc<AtomicBool>,
}

/// Binds `host` and accepts line feeders until `stop` is raised.
///
/// Binding happens before returning so address errors surface to the caller.
pub fn spawn_listener(host: SocketAddr, sink: FeedSink) -> Result<(SocketAddr, thread::JoinHandle<()>)> {
    let listener = TcpListener::bind(host).with_context(|| format!("Binding TCP listener at {host}"))?;
    listener
        .set_nonblocking(true)
        .context("Setting TCP listener non-blocking mode")?;
    let local = listener.local_addr().context("Reading bound address")?;
    info!(addr = %local, format = ?sink.format, "Listening for feeders");

    let handle = thread::spawn(move || accept_loop(listener, sink));
    Ok((local, handle))
}

fn accept_loop(listener: TcpListener, sink: FeedSink) {
    let mut connections = Vec::new();
    while !sink.stop.load(Ordering::Relaxed) {
        let (stream, addr) = match listener.accept() {
            Ok(conn) => conn,
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                // avoid busy loop
                thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(e) => {
                warn!(?e, "Accept failed");
                continue;
            }
        };
        info!(%addr, "Feeder connected");
        let _ = sink.status.send(format!("Connected: {addr}"));
        sink.shared.insert(addr);

        let conn_sink = sink.clone();
        connections.push(thread::spawn(move || {
            if let Err(e) = read_feeder(stream, addr, &conn_sink) {
                warn!(?e, %addr, "Feeder read error");
            }
            conn_sink.shared.remove(&addr);
            let _ = conn_sink.status.send(format!("Disconnected: {addr}"));
            info!(%addr, "Feeder closed");
        }));
        connections.retain(|h| !h.is_finished());
    }
    for handle in connections {
        let _ = handle.join();
    }
    sink.shared.dispose();
}

fn read_feeder(mut stream: TcpStream, addr: SocketAddr, sink: &FeedSink) -> Result<()> {
    stream
        .set_nonblocking(false)
        .context("Setting feeder stream blocking mode")?;
    stream
        .set_read_timeout(Some(Duration::from_millis(200)))
        .context("Setting feeder read timeout")?;

    let mut buffer = [0u8; 4096];
    let mut lines = LineBuffer::new(MAX_LINE_BYTES);
    while !sink.stop.load(Ordering::Relaxed) {
        match stream.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                for line in lines.push(&buffer[..n], addr) {
                    if !deliver(&line, addr, sink) {
                        return Ok(());
                    }
                }
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => return Err(e.into()),
        }
    }
    // trailing line without newline
    if let Some(rest) = lines.finish() {
        deliver(&rest, addr, sink);
    }
    Ok(())
}

/// Splits a byte stream into `\n`-terminated lines of bounded length.
struct LineBuffer {
    pending: Vec<u8>,
    limit: usize,
    // Inside an overlong line; skip up to the next newline.
    discarding: bool,
}

impl LineBuffer {
    fn new(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            limit,
            discarding: false,
        }
    }

    /// Complete lines found in `bytes`. Only the new bytes are scanned.
    fn push(&mut self, bytes: &[u8], addr: SocketAddr) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut rest = bytes;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(pos + 1);
            if self.discarding {
                self.discarding = false;
            } else if self.pending.len() + head.len() > self.limit + 1 {
                warn!(%addr, limit = self.limit, "Dropping overlong feeder line");
                self.pending.clear();
            } else {
                self.pending.extend_from_slice(head);
                out.push(std::mem::take(&mut self.pending));
            }
            rest = tail;
        }
        if !self.discarding {
            if self.pending.len() + rest.len() > self.limit {
                warn!(%addr, limit = self.limit, "Dropping overlong feeder line");
                self.pending.clear();
                self.discarding = true;
            } else {
                self.pending.extend_from_slice(rest);
            }
        }
        out
    }

    fn finish(self) -> Option<Vec<u8>> {
        (!self.discarding && !self.pending.is_empty()).then_some(self.pending)
    }
}

/// Returns false once the monitor side has gone away.
fn deliver(raw: &[u8], addr: SocketAddr, sink: &FeedSink) -> bool {
    let line = String::from_utf8_lossy(raw);
    match parse_line(&line, sink.format) {
        Ok(Some(ping)) => {
            sink.shared.record_line(&addr);
            sink.pings.send(ping).is_ok()
        }
        Ok(None) => true,
        Err(e) => {
            warn!(error = %e, %addr, "Skipping malformed line");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel as channel;
    use std::io::Write;

    fn sink(format: LineFormat) -> (FeedSink, channel::Receiver<Ping>, channel::Receiver<String>) {
        let (pings, ping_rx) = channel::unbounded();
        let (status, status_rx) = channel::unbounded();
        let sink = FeedSink {
            format,
            pings,
            status,
            shared: Arc::new(SharedState::new()),
            stop: Arc::new(AtomicBool::new(false)),
        };
        (sink, ping_rx, status_rx)
    }

    #[test]
    fn feeder_lines_become_pings() {
        let (sink, ping_rx, status_rx) = sink(LineFormat::Text);
        let stop = sink.stop.clone();
        let shared = sink.shared.clone();
        let (addr, handle) = spawn_listener("127.0.0.1:0".parse().unwrap(), sink).unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"jobs\tstarted\nerrors\n").unwrap();
        client.write_all(b"jobs\tdone").unwrap();
        client.flush().unwrap();

        let first = ping_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let second = ping_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first, Ping { name: "jobs".into(), payload: "started".into() });
        assert_eq!(second.name, "errors");
        assert!(status_rx.recv_timeout(Duration::from_secs(5)).unwrap().starts_with("Connected"));
        assert_eq!(shared.summary().first().map(|(_, n)| *n), Some(2));

        drop(client);
        let third = ping_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(third.payload, "done");

        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();
        assert!(shared.summary().is_empty());
    }

    fn local() -> SocketAddr {
        "127.0.0.1:9".parse().unwrap()
    }

    #[test]
    fn line_buffer_joins_lines_split_across_reads() {
        let mut lines = LineBuffer::new(64);
        assert!(lines.push(b"jo", local()).is_empty());
        let out = lines.push(b"bs\nerr", local());
        assert_eq!(out, [b"jobs\n".to_vec()]);
        assert_eq!(lines.finish(), Some(b"err".to_vec()));
    }

    #[test]
    fn overlong_line_is_dropped_whole() {
        let mut lines = LineBuffer::new(8);
        assert!(lines.push(b"0123456789", local()).is_empty());
        assert!(lines.pending.is_empty());
        assert!(lines.push(b"abcdef", local()).is_empty());
        let out = lines.push(b"tail\nok\n", local());
        assert_eq!(out, [b"ok\n".to_vec()]);
        assert_eq!(lines.finish(), None);
    }

    #[test]
    fn overlong_line_within_one_read_is_dropped() {
        let mut lines = LineBuffer::new(4);
        let out = lines.push(b"abcdefgh\nab\n", local());
        assert_eq!(out, [b"ab\n".to_vec()]);
    }

    #[test]
    fn pending_bytes_stay_bounded() {
        let mut lines = LineBuffer::new(16);
        for _ in 0..1000 {
            lines.push(b"no newline here ", local());
            assert!(lines.pending.len() <= 16);
        }
    }

    #[test]
    fn bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();
        let (sink, _p, _s) = sink(LineFormat::Json);
        let err = spawn_listener(addr, sink).unwrap_err();
        assert!(err.to_string().contains("Binding TCP listener"));
    }
}
