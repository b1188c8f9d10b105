//! Serial link to the motor controller.
//!
//! The link is owned by a single worker thread, fed through a bounded queue,
//! so frames never interleave on the wire. The rest of the crate talks to
//! the worker through a cloneable [MotorHandle].
use std::{
    io::{ErrorKind, Read, Write},
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::{debug, error, trace, warn};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::{
    cfg::LinkConfig,
    error::CommunicationError,
    mount::protocol::{
        decode_response, encode_query, Command, Query, Reading, Response, RESPONSE_LEN,
    },
};

/// Implement this trait to provide a byte link to the motor controller.
/// Both calls may block, up to the link timeout.
pub trait MotorLink: Send {
    /// Writes one command frame
    fn send(&mut self, frame: &Command) -> Result<(), CommunicationError>;
    /// Reads one response frame
    fn receive(&mut self) -> Result<Response, CommunicationError>;
}

impl<L: MotorLink + ?Sized> MotorLink for Box<L> {
    fn send(&mut self, frame: &Command) -> Result<(), CommunicationError> {
        (**self).send(frame)
    }
    fn receive(&mut self) -> Result<Response, CommunicationError> {
        (**self).receive()
    }
}

/// [MotorLink] over any byte stream
pub struct StreamLink<T> {
    stream: T,
}

impl<T: Read + Write> StreamLink<T> {
    pub fn new(stream: T) -> Self {
        Self { stream }
    }
}

impl StreamLink<Box<dyn serialport::SerialPort>> {
    /// Opens the serial device (8N1) described by [LinkConfig]
    pub fn open_serial(cfg: &LinkConfig) -> Result<Self, CommunicationError> {
        let port = serialport::new(&cfg.port, cfg.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(cfg.timeout())
            .open()
            .map_err(|e| CommunicationError::Io(format!("{}: {}", cfg.port, e)))?;
        debug!("opened {} @{} bauds", cfg.port, cfg.baud_rate);
        Ok(Self::new(port))
    }
}

impl StreamLink<TcpStream> {
    /// Connects to a serial over TCP bridge
    pub fn connect_tcp<A: ToSocketAddrs>(addr: A, timeout: Duration) -> Result<Self, CommunicationError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;
        debug!("connected to {:?}", stream.peer_addr());
        Ok(Self::new(stream))
    }
}

impl<T: Read + Write + Send> MotorLink for StreamLink<T> {
    fn send(&mut self, frame: &Command) -> Result<(), CommunicationError> {
        self.stream.write_all(frame)?;
        self.stream.flush()?;
        Ok(())
    }
    fn receive(&mut self) -> Result<Response, CommunicationError> {
        let mut frame = [0u8; RESPONSE_LEN];
        let mut got = 0;
        while got < RESPONSE_LEN {
            match self.stream.read(&mut frame[got..]) {
                Ok(0) if got == 0 => return Err(CommunicationError::LinkClosed),
                Ok(0) => {
                    return Err(CommunicationError::ShortRead {
                        expected: RESPONSE_LEN,
                        got,
                    })
                },
                Ok(n) => got += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(match CommunicationError::from(e) {
                        CommunicationError::Timeout if got > 0 => CommunicationError::ShortRead {
                            expected: RESPONSE_LEN,
                            got,
                        },
                        e => e,
                    })
                },
            }
        }
        Ok(frame)
    }
}

enum Request {
    Query {
        query: Query,
        reply: oneshot::Sender<Result<Reading, CommunicationError>>,
    },
    Set(Command),
}

/// Handle to the link worker. The worker exits (closing the link) once
/// every handle is dropped, or after the first communication failure.
#[derive(Clone)]
pub struct MotorHandle {
    requests: mpsc::Sender<Request>,
    token: CancellationToken,
}

impl MotorHandle {
    /// Moves `link` to a dedicated worker thread, serving at most
    /// `queue_depth` pending requests.
    pub fn spawn<L: MotorLink + 'static>(
        link: L,
        queue_depth: usize,
    ) -> Result<Self, CommunicationError> {
        let (requests, rx) = mpsc::channel(queue_depth.max(1));
        let token = CancellationToken::new();
        let worker_token = token.clone();
        std::thread::Builder::new()
            .name("motor-link".to_string())
            .spawn(move || worker(link, rx, worker_token))?;
        Ok(Self { requests, token })
    }
    /// Sends a STATUS or STOP and waits for the mount answer
    pub async fn query(&self, query: Query) -> Result<Reading, CommunicationError> {
        if self.token.is_cancelled() {
            return Err(CommunicationError::LinkClosed);
        }
        let (reply, answer) = oneshot::channel();
        self.requests
            .send(Request::Query { query, reply })
            .await
            .map_err(|_| CommunicationError::LinkClosed)?;
        answer.await.map_err(|_| CommunicationError::LinkClosed)?
    }
    /// Queues a SET frame, without waiting for it to be written.
    /// The frame is dropped if the queue is full.
    pub fn set(&self, frame: Command) -> Result<(), CommunicationError> {
        if self.token.is_cancelled() {
            return Err(CommunicationError::LinkClosed);
        }
        match self.requests.try_send(Request::Set(frame)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("link queue full: SET dropped");
                Ok(())
            },
            Err(mpsc::error::TrySendError::Closed(_)) => Err(CommunicationError::LinkClosed),
        }
    }
    /// True once the link failed or was closed
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
    /// Resolves once the link failed or was closed
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
    /// Closes the link: pending and future requests fail
    pub fn close(&self) {
        self.token.cancel();
    }
}

fn worker<L: MotorLink>(mut link: L, mut rx: mpsc::Receiver<Request>, token: CancellationToken) {
    debug!("link worker started");
    while let Some(request) = rx.blocking_recv() {
        if token.is_cancelled() {
            break;
        }
        let result = match request {
            Request::Query { query, reply } => {
                let result = link
                    .send(&encode_query(query))
                    .and_then(|_| link.receive())
                    .and_then(|frame| decode_response(&frame));
                trace!("{} - {:?}", query, result);
                let status = result.as_ref().map(|_| ()).map_err(Clone::clone);
                let _ = reply.send(result);
                status
            },
            Request::Set(frame) => {
                trace!("SET - {:02x?}", frame);
                link.send(&frame)
            },
        };
        if let Err(e) = result {
            error!("link failure: {}", e);
            token.cancel();
            break;
        }
    }
    // unblock pending requesters
    rx.close();
    debug!("link worker stopped");
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mount::{
        protocol::{encode_response, encode_set},
        sim::SimulatedMount,
        MountLimits, Pointing,
    };
    use std::io::Cursor;

    /// Replays canned bytes, then fails with `tail`
    struct Canned {
        input: Cursor<Vec<u8>>,
        tail: ErrorKind,
        output: Vec<u8>,
    }

    impl Read for Canned {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.input.read(buf)?;
            if n == 0 && self.tail != ErrorKind::UnexpectedEof {
                return Err(self.tail.into());
            }
            Ok(n)
        }
    }

    impl Write for Canned {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn canned(input: &[u8], tail: ErrorKind) -> StreamLink<Canned> {
        StreamLink::new(Canned {
            input: Cursor::new(input.to_vec()),
            tail,
            output: Vec::new(),
        })
    }

    #[test]
    fn stream_frames() {
        let reading = Reading {
            pointing: Pointing::new(10.0, 20.0),
            pulse: 10,
        };
        let response = encode_response(0x57, &reading);
        let mut link = canned(&response, ErrorKind::TimedOut);
        link.send(&encode_query(Query::Status)).unwrap();
        assert_eq!(link.stream.output, encode_query(Query::Status).to_vec());
        assert_eq!(link.receive().unwrap(), response);
        assert_eq!(link.receive(), Err(CommunicationError::Timeout));
    }

    #[test]
    fn stream_short_read() {
        let mut link = canned(&[0x57, 3, 7, 0], ErrorKind::TimedOut);
        assert_eq!(
            link.receive(),
            Err(CommunicationError::ShortRead {
                expected: RESPONSE_LEN,
                got: 4
            })
        );
        let mut link = canned(&[0x57, 3, 7, 0], ErrorKind::UnexpectedEof);
        assert_eq!(
            link.receive(),
            Err(CommunicationError::ShortRead {
                expected: RESPONSE_LEN,
                got: 4
            })
        );
        let mut link = canned(&[], ErrorKind::UnexpectedEof);
        assert_eq!(link.receive(), Err(CommunicationError::LinkClosed));
    }

    #[tokio::test]
    async fn worker_serves_requests() {
        let mount = SimulatedMount::new(10);
        let handle = MotorHandle::spawn(mount.clone(), 4).unwrap();

        let frame = encode_set(Pointing::new(12.3, 45.6), 10, &MountLimits::default()).unwrap();
        handle.set(frame).unwrap();
        let reading = handle.query(Query::Status).await.unwrap();
        assert!((reading.pointing.azimuth_deg - 12.3).abs() < 0.1);
        assert!((reading.pointing.elevation_deg - 45.6).abs() < 0.1);
        assert_eq!(reading.pulse, 10);
        assert_eq!(mount.frames().len(), 2);
        assert!(!handle.is_closed());
    }

    #[tokio::test]
    async fn failure_closes_the_link() {
        let mount = SimulatedMount::new(10);
        mount.set_pulse_mismatch(true);
        let handle = MotorHandle::spawn(mount.clone(), 4).unwrap();

        assert_eq!(
            handle.query(Query::Status).await,
            Err(CommunicationError::PulseMismatch {
                horizontal: 10,
                vertical: 11
            })
        );
        handle.closed().await;
        assert!(handle.is_closed());
        assert_eq!(
            handle.query(Query::Status).await,
            Err(CommunicationError::LinkClosed)
        );
        assert_eq!(handle.set([0; 13]), Err(CommunicationError::LinkClosed));
        // nothing written past the failure
        assert_eq!(mount.frames().len(), 1);
    }
}
