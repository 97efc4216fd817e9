use std::io::{self, Cursor};
use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};
use tokio::net::{UnixListener, UnixStream};

use crate::bridge::{self, Bridge, Reply};
use crate::command::{Call, MAGIC};
use crate::Error;

pub struct Ipc {
    listener: UnixListener,
    bridge:   Arc<Bridge>,
}

impl Ipc {
    pub fn bind<P>(path: P, bridge: Bridge) -> Result<Ipc, Error>
        where
        P: AsRef<Path>
    {
        let listener = UnixListener::bind(path)?;

        Ok(Self { listener, bridge: Arc::new(bridge) })
    }

    pub async fn listen(&self) -> Result<(), std::io::Error> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    debug!("A new client has been connected");

                    let bridge = self.bridge.clone();

                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_client(stream, bridge).await {
                            debug!("Client connection closed: {e}");
                        }
                    });
                },
                Err(e) => {
                    warn!("couldn't accept client connection: {e}");
                    return Err(e)
                }
            }
        }
    }

    async fn handle_client(stream: UnixStream, bridge: Arc<Bridge>) -> Result<(), Error> {
        let mut buf = [0; 256];

        loop {
            stream.readable().await?;

            for call in Self::read_calls(&stream, &mut buf)? {
                let reply = bridge.call(&call.name).await;

                debug!("Replying to `{}` with {reply:?}", call.name);

                Self::send(&stream, &reply.to_le_bytes()).await?;
            }
        }
    }

    fn read_calls(stream: &UnixStream, buf: &mut [u8]) -> Result<Vec<Call>, Error> {
        match stream.try_read(buf) {
            Ok(0) => {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "read 0 bytes from stream, client has disconnected").into())
            }
            Ok(n) => {
                debug!("Received {n} bytes");

                let mut calls = Vec::new();
                let mut rest = &buf[..n];

                while let Some(i) = rest.windows(MAGIC.len()).position(|window| window == MAGIC) {
                    let mut r = Cursor::new(&rest[i + MAGIC.len()..]);

                    match Call::read(&mut r) {
                        Ok(call) => calls.push(call),
                        Err(e)   => warn!("Couldn't parse incoming call: {e}"),
                    }

                    let len = (i as u64 + MAGIC.len() as u64 + r.position()).min(rest.len() as u64);
                    rest = &rest[len as usize..];
                }

                Ok(calls)
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// One call against a running server: connect, send, await the reply.
    pub async fn query<P>(path: P, call: &Call) -> Result<Reply, Error>
        where
        P: AsRef<Path>
    {
        let stream = UnixStream::connect(path).await?;

        Self::send(&stream, &call.to_le_bytes()).await?;

        let mut buf = [0; 256];

        loop {
            stream.readable().await?;

            match stream.try_read(&mut buf) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "server disconnected before replying").into())
                }
                Ok(n) => {
                    let bytes = &buf[..n];

                    let Some(i) = bytes.windows(bridge::MAGIC.len()).position(|window| window == bridge::MAGIC) else {
                        warn!("Skipping {n} bytes with no reply frame");
                        continue;
                    };

                    return Reply::read(&mut Cursor::new(&bytes[i + bridge::MAGIC.len()..]))
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn send(stream: &UnixStream, buf: &[u8]) -> Result<(), Error> {
        loop {
            stream.writable().await?;

            match stream.try_write(buf) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "couldn't write a single byte to stream, client has disconnected").into())
                }
                Ok(n) => {
                    if n != buf.len() { warn!("Couldn't write all bytes in reply, client might be confused. This incident will be ignored...") }

                    return Ok(())
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use tempfile::TempDir;

    use crate::host::sysfs::SysfsBattery;

    #[tokio::test]
    async fn scans_calls_out_of_the_byte_stream() {
        let (a, b) = UnixStream::pair().unwrap();

        let mut bytes = vec![0xAA, 0xBB];
        bytes.extend(Call::new("getBatteryLevel").to_le_bytes());
        bytes.extend(Call::new("getFoo").to_le_bytes());

        a.writable().await.unwrap();
        a.try_write(&bytes).unwrap();

        b.readable().await.unwrap();

        let mut buf = [0; 256];
        let calls = Ipc::read_calls(&b, &mut buf).unwrap();

        assert_eq!(calls, vec![Call::new("getBatteryLevel"), Call::new("getFoo")]);
    }

    #[tokio::test]
    async fn disconnect_reads_as_broken_pipe() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(a);

        b.readable().await.unwrap();

        let mut buf = [0; 256];

        assert!(matches!(Ipc::read_calls(&b, &mut buf), Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn serves_a_call_end_to_end() {
        let tmp = TempDir::new().unwrap();

        let supplies = tmp.path().join("power_supply");
        let battery = supplies.join("BAT0");
        fs::create_dir_all(&battery).unwrap();
        fs::write(battery.join("uevent"), "POWER_SUPPLY_TYPE=Battery\nPOWER_SUPPLY_CAPACITY=64\n").unwrap();

        let socket = tmp.path().join("voltio.sock");
        let ipc = Ipc::bind(&socket, Bridge::with_host(SysfsBattery::at(&supplies))).unwrap();

        tokio::spawn(async move { ipc.listen().await });

        let reply = Ipc::query(&socket, &Call::new("getBatteryLevel")).await.unwrap();
        assert_eq!(reply, Reply::Level(64));

        let reply = Ipc::query(&socket, &Call::new("getFoo")).await.unwrap();
        assert_eq!(reply, Reply::NotImplemented("getFoo".to_owned()));
    }
}
