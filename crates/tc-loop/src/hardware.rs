//! Line protocol of the two-heater lab board.
//!
//! Every request is one ASCII line and gets exactly one reply line:
//!
//! | request      | reply                      |
//! |--------------|----------------------------|
//! | `T1`, `T2`   | temperature in °C          |
//! | `Q1 <u>`     | heater 1 power now applied |
//! | `Q2 <u>`     | heater 2 power now applied |
//! | `X`          | anything; both heaters off |
//!
//! The transport is a byte stream split into its read and write halves. On a
//! real board both are handles to the serial device, which must already be
//! configured (115200 baud, raw). Replies are read on their own thread and
//! handed over through a channel, so every request waits at most
//! `reply_timeout` even when the board has gone silent.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use tc_core::{Channel, Commands, Measurements, Plant, TcError, TcResult};
use tracing::{debug, info};

/// Upper bound on a reply line; the board never sends more than a few bytes.
const MAX_LINE: usize = 128;

/// How long a request waits for its reply unless configured otherwise.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Plant backed by the board's text protocol.
#[derive(Debug)]
pub struct SerialPlant<W: Write> {
    port: W,
    replies: Receiver<TcResult<String>>,
    reply_timeout: Duration,
    stopped: bool,
}

impl<W: Write> SerialPlant<W> {
    /// `reader` and `port` are the receive and send halves of one transport.
    ///
    /// The reader thread is detached. It exits when the transport reports
    /// end of stream or an error, or on the first reply after the plant is
    /// dropped.
    pub fn new<R>(reader: R, port: W, reply_timeout: Duration) -> TcResult<Self>
    where
        R: Read + Send + 'static,
    {
        let (tx, replies) = mpsc::channel();
        thread::Builder::new()
            .name("board-replies".into())
            .spawn(move || forward_replies(reader, &tx))
            .map_err(|source| TcError::Io {
                op: "spawn board reader",
                source,
            })?;
        Ok(Self {
            port,
            replies,
            reply_timeout,
            stopped: false,
        })
    }

    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    pub fn into_inner(self) -> W {
        self.port
    }

    /// Send one request line and return the trimmed reply.
    ///
    /// # Errors
    ///
    /// `Io` with `ErrorKind::TimedOut` if no reply arrives in time.
    pub fn command(&mut self, request: &str) -> TcResult<String> {
        // Replies to requests that already timed out.
        while let Ok(late) = self.replies.try_recv() {
            debug!(reply = ?late, "discarding late board reply");
        }

        debug!(request, "board request");
        self.port
            .write_all(request.as_bytes())
            .and_then(|_| self.port.write_all(b"\n"))
            .and_then(|_| self.port.flush())
            .map_err(|source| TcError::Io {
                op: "write to board",
                source,
            })?;

        match self.replies.recv_timeout(self.reply_timeout) {
            Ok(reply) => reply,
            Err(RecvTimeoutError::Timeout) => Err(TcError::Io {
                op: "read from board",
                source: io::Error::new(
                    ErrorKind::TimedOut,
                    format!(
                        "no reply to '{request}' within {} ms",
                        self.reply_timeout.as_millis()
                    ),
                ),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(TcError::Io {
                op: "read from board",
                source: io::Error::new(ErrorKind::UnexpectedEof, "board reply stream closed"),
            }),
        }
    }

    fn temperature(&mut self, channel: Channel) -> TcResult<f64> {
        let reply = self.command(&format!("T{}", channel.number()))?;
        reply.parse::<f64>().map_err(|_| TcError::Protocol {
            what: format!("T{} reply '{reply}' is not a number", channel.number()),
        })
    }
}

fn forward_replies<R: Read>(reader: R, replies: &Sender<TcResult<String>>) {
    let mut reader = BufReader::new(reader);
    loop {
        let reply = read_line(&mut reader);
        let closed = matches!(reply, Err(TcError::Io { .. }));
        if replies.send(reply).is_err() || closed {
            break;
        }
    }
    debug!("board reader exiting");
}

fn read_line<R: Read>(reader: &mut R) -> TcResult<String> {
    let mut line = Vec::new();
    let mut overflow = false;
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => {
                return Err(TcError::Io {
                    op: "read from board",
                    source: ErrorKind::UnexpectedEof.into(),
                });
            }
            Ok(_) if byte[0] == b'\n' => break,
            Ok(_) if line.len() < MAX_LINE => line.push(byte[0]),
            // Keep consuming so the next reply starts on its own line.
            Ok(_) => overflow = true,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(TcError::Io {
                    op: "read from board",
                    source,
                });
            }
        }
    }
    if overflow {
        return Err(TcError::Protocol {
            what: "reply line too long".into(),
        });
    }
    let text = String::from_utf8(line).map_err(|_| TcError::Protocol {
        what: "reply is not UTF-8".into(),
    })?;
    Ok(text.trim().to_string())
}

impl<W: Write + Send> Plant for SerialPlant<W> {
    fn read(&mut self) -> TcResult<Measurements> {
        if self.stopped {
            return Err(TcError::Stopped);
        }
        Ok(Measurements::new(
            self.temperature(Channel::One)?,
            self.temperature(Channel::Two)?,
        ))
    }

    fn write(&mut self, commands: Commands) -> TcResult<()> {
        if self.stopped {
            return Err(TcError::Stopped);
        }
        let commands = commands.clamped();
        for ch in Channel::ALL {
            self.command(&format!("Q{} {:.2}", ch.number(), commands.get(ch)))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> TcResult<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.command("X")?;
        info!("board heaters switched off");
        Ok(())
    }
}

/// Open a board on an already configured serial device, e.g. `/dev/ttyACM0`.
pub fn open_device(path: &Path, reply_timeout: Duration) -> TcResult<SerialPlant<File>> {
    let port = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| TcError::Io {
            op: "open serial device",
            source,
        })?;
    let reader = port.try_clone().map_err(|source| TcError::Io {
        op: "clone serial device handle",
        source,
    })?;
    info!(device = %path.display(), "board connected");
    SerialPlant::new(reader, port, reply_timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BackgroundPlant;
    use std::collections::VecDeque;
    use std::time::Instant;

    const TIMEOUT: Duration = Duration::from_millis(100);

    /// Board side of the fake: each request line releases the next scripted
    /// reply. Past the end of the script the board hangs up, or goes silent
    /// for good.
    struct Replies {
        script: VecDeque<Vec<u8>>,
        pending: Vec<u8>,
        released: Receiver<()>,
        silent: bool,
    }

    impl Read for Replies {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            while self.pending.is_empty() {
                if self.released.recv().is_err() {
                    return Ok(0);
                }
                match self.script.pop_front() {
                    Some(reply) => self.pending = reply,
                    None if self.silent => loop {
                        thread::park();
                    },
                    None => return Ok(0),
                }
            }
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            Ok(n)
        }
    }

    /// Host side of the fake: captures requests.
    struct Requests {
        sent: Vec<u8>,
        release: Sender<()>,
    }

    impl Write for Requests {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            for &b in buf {
                self.sent.push(b);
                if b == b'\n' {
                    // The board side is gone once it has hung up.
                    let _ = self.release.send(());
                }
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn board(replies: &[&str], silent: bool) -> SerialPlant<Requests> {
        let (release, released) = mpsc::channel();
        let reader = Replies {
            script: replies.iter().map(|r| r.as_bytes().to_vec()).collect(),
            pending: Vec::new(),
            released,
            silent,
        };
        let requests = Requests {
            sent: Vec::new(),
            release,
        };
        SerialPlant::new(reader, requests, TIMEOUT).unwrap()
    }

    fn assert_timed_out(result: TcResult<impl std::fmt::Debug>) {
        match result {
            Err(TcError::Io { source, .. }) => assert_eq!(source.kind(), ErrorKind::TimedOut),
            other => panic!("expected a timeout, got {other:?}"),
        }
    }

    #[test]
    fn reads_both_temperatures() {
        let mut board = board(&["24.51\r\n", "30.02\n"], false);
        let m = board.read().unwrap();
        assert_eq!(m, Measurements::new(24.51, 30.02));
        assert_eq!(board.into_inner().sent, b"T1\nT2\n");
    }

    #[test]
    fn writes_clamped_heater_powers() {
        let mut board = board(&["100.00\n", "0.00\n"], false);
        board.write(Commands::new(120.0, -3.0)).unwrap();
        assert_eq!(board.into_inner().sent, b"Q1 100.00\nQ2 0.00\n");
    }

    #[test]
    fn stop_sends_x_once() {
        let mut board = board(&["Stop\n"], false);
        board.stop().unwrap();
        board.stop().unwrap();
        assert!(matches!(board.read(), Err(TcError::Stopped)));
        assert_eq!(board.into_inner().sent, b"X\n");
    }

    #[test]
    fn malformed_and_missing_replies() {
        let mut b = board(&["hello\n"], false);
        assert!(matches!(b.read(), Err(TcError::Protocol { .. })));

        // Hung up before answering.
        let mut b = board(&[], false);
        match b.read() {
            Err(TcError::Io { source, .. }) => assert_eq!(source.kind(), ErrorKind::UnexpectedEof),
            other => panic!("expected end of stream, got {other:?}"),
        }

        let long = format!("{}\n", "9".repeat(MAX_LINE + 10));
        let mut b = board(&[long.as_str(), "21.5\n", "22.5\n"], false);
        assert!(matches!(b.read(), Err(TcError::Protocol { .. })));
        assert_eq!(b.read().unwrap(), Measurements::new(21.5, 22.5));
    }

    #[test]
    fn truncated_reply_times_out() {
        let mut b = board(&["21.0"], false);
        let started = Instant::now();
        assert_timed_out(b.read());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn silent_board_times_out_every_request() {
        let mut b = board(&["21.0\n"], true);
        assert_timed_out(b.read());
        assert_timed_out(b.write(Commands::zero()));
        assert_timed_out(b.stop());
    }

    #[test]
    fn silent_board_does_not_block_the_control_loop() {
        let b = board(&["21.0\n", "22.0\n"], true);
        let mut bg = BackgroundPlant::spawn(b, Duration::from_millis(5)).unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let control = thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(2);
            let fault = loop {
                match bg.read() {
                    Err(e) => break Some(e),
                    Ok(_) if Instant::now() < deadline => thread::sleep(Duration::from_millis(1)),
                    Ok(_) => break None,
                }
            };
            let zeroed = bg.write(Commands::zero());
            let stopped = bg.stop();
            done_tx.send((fault, zeroed, stopped)).unwrap();
        });

        let (fault, zeroed, stopped) = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("control thread blocked on a silent board");
        control.join().unwrap();
        match fault {
            Some(TcError::Io { source, .. }) => assert_eq!(source.kind(), ErrorKind::TimedOut),
            other => panic!("expected the cached timeout, got {other:?}"),
        }
        assert_timed_out(zeroed);
        assert_timed_out(stopped);
    }
}
