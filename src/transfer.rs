//! Transfer framing (Component A).
//!
//! Typed wire read/write primitives over any `AsyncRead + AsyncWrite` stream.
//! A command message is a sequence of writes followed by [`Transfer::done`],
//! which flushes and waits for the server's response header. Reads/writes on
//! a single `Transfer` are serialized by the caller holding the owning
//! session's lock (§4.1, §5) — `Transfer` itself is not `Sync`-guarded.

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::{Error, TransportError};
use crate::value::{Endpoint, Value};

/// A typed, length-framed byte stream to one peer.
pub struct Transfer<S> {
    stream: S,
    endpoint: Endpoint,
    write_buf: BytesMut,
    read_buf: BytesMut,
}

impl<S> Transfer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, endpoint: Endpoint) -> Self {
        Transfer {
            stream,
            endpoint,
            write_buf: BytesMut::with_capacity(4096),
            read_buf: BytesMut::with_capacity(4096),
        }
    }

    pub fn write_int(&mut self, v: i32) {
        self.write_buf.put_i32(v);
    }

    pub fn write_long(&mut self, v: i64) {
        self.write_buf.put_i64(v);
    }

    pub fn write_string(&mut self, s: &str) {
        self.write_buf.put_i32(s.len() as i32);
        self.write_buf.put_slice(s.as_bytes());
    }

    pub fn write_value(&mut self, v: &Value) {
        match v {
            Value::Null => self.write_buf.put_i8(0),
            Value::Bool(b) => {
                self.write_buf.put_i8(1);
                self.write_buf.put_u8(*b as u8);
            }
            Value::Int(i) => {
                self.write_buf.put_i8(2);
                self.write_buf.put_i64(*i);
            }
            Value::Double(d) => {
                self.write_buf.put_i8(3);
                self.write_buf.put_f64(*d);
            }
            Value::Bytes(b) => {
                self.write_buf.put_i8(4);
                self.write_buf.put_i32(b.len() as i32);
                self.write_buf.put_slice(b);
            }
            Value::Str(s) => {
                self.write_buf.put_i8(5);
                self.write_string(s);
            }
            Value::Uuid(u) => {
                self.write_buf.put_i8(6);
                self.write_buf.put_slice(u.as_bytes());
            }
        }
    }

    /// Writes `params.len()` followed by each value, matching the wire
    /// convention in §6 (`count:int` then `count` encoded values).
    pub fn write_params(&mut self, params: &[Value]) {
        self.write_int(params.len() as i32);
        for p in params {
            self.write_value(p);
        }
    }

    /// Flushes pending writes and blocks until at least one response byte is
    /// buffered, i.e. the suspension point named in §5. Transport errors here
    /// are the only ones that route through `Session::handle_exception`.
    pub async fn done(&mut self) -> Result<(), Error> {
        self.stream
            .write_all(&self.write_buf)
            .await
            .map_err(|source| TransportError::Io {
                endpoint: self.endpoint,
                source,
            })?;
        self.stream
            .flush()
            .await
            .map_err(|source| TransportError::Io {
                endpoint: self.endpoint,
                source,
            })?;
        self.write_buf.clear();
        Ok(())
    }

    async fn fill(&mut self, n: usize) -> Result<(), Error> {
        while self.read_buf.len() < n {
            let mut chunk = [0u8; 4096];
            let read = self
                .stream
                .read(&mut chunk)
                .await
                .map_err(|source| TransportError::Io {
                    endpoint: self.endpoint,
                    source,
                })?;
            if read == 0 {
                return Err(TransportError::ShortRead {
                    endpoint: self.endpoint,
                    expected: n,
                    actual: self.read_buf.len(),
                }
                .into());
            }
            self.read_buf.extend_from_slice(&chunk[..read]);
        }
        Ok(())
    }

    pub async fn read_int(&mut self) -> Result<i32, Error> {
        self.fill(4).await?;
        Ok(self.read_buf.get_i32())
    }

    pub async fn read_long(&mut self) -> Result<i64, Error> {
        self.fill(8).await?;
        Ok(self.read_buf.get_i64())
    }

    pub async fn read_bool(&mut self) -> Result<bool, Error> {
        self.fill(1).await?;
        Ok(self.read_buf.get_u8() != 0)
    }

    pub async fn read_string(&mut self) -> Result<String, Error> {
        let len = self.read_int().await? as usize;
        self.fill(len).await?;
        let bytes = self.read_buf.split_to(len);
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn read_value(&mut self) -> Result<Value, Error> {
        self.fill(1).await?;
        let tag = self.read_buf.get_i8();
        Ok(match tag {
            0 => Value::Null,
            1 => Value::Bool(self.read_bool().await?),
            2 => Value::Int(self.read_long().await?),
            3 => {
                self.fill(8).await?;
                Value::Double(self.read_buf.get_f64())
            }
            4 => {
                let len = self.read_int().await? as usize;
                self.fill(len).await?;
                Value::Bytes(self.read_buf.split_to(len).to_vec())
            }
            5 => Value::Str(self.read_string().await?),
            6 => {
                self.fill(16).await?;
                let bytes = self.read_buf.split_to(16);
                Value::Uuid(uuid::Uuid::from_slice(&bytes).expect("16 bytes"))
            }
            other => {
                return Err(crate::errors::ProtocolError::UnexpectedTag {
                    expected: "value tag 0..=6",
                    actual: other as u8,
                }
                .into())
            }
        })
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::duplex;

    fn test_endpoint() -> Endpoint {
        "127.0.0.1:1".parse::<SocketAddr>().unwrap().into()
    }

    #[tokio::test]
    async fn round_trips_every_value_variant() {
        let (client, mut server) = duplex(4096);
        let mut transfer = Transfer::new(client, test_endpoint());

        let values = vec![
            Value::Null,
            Value::Bool(true),
            Value::Int(-7),
            Value::Double(3.5),
            Value::Bytes(vec![1, 2, 3]),
            Value::Str("hi".into()),
            Value::Uuid(uuid::Uuid::nil()),
        ];
        for v in &values {
            transfer.write_value(v);
        }
        transfer.done().await.unwrap();

        let mut buf = vec![0u8; 4096];
        let n = tokio::io::AsyncReadExt::read(&mut server, &mut buf).await.unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut server, &buf[..n])
            .await
            .unwrap();

        for expected in &values {
            let got = transfer.read_value().await.unwrap();
            assert_eq!(&got, expected);
        }
    }

    #[tokio::test]
    async fn write_params_prefixes_count() {
        let (client, mut server) = duplex(4096);
        let mut transfer = Transfer::new(client, test_endpoint());
        transfer.write_params(&[Value::Int(1), Value::Int(2)]);
        transfer.done().await.unwrap();

        let mut buf = vec![0u8; 64];
        let n = tokio::io::AsyncReadExt::read(&mut server, &mut buf).await.unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut server, &buf[..n])
            .await
            .unwrap();

        assert_eq!(transfer.read_int().await.unwrap(), 2);
    }
}
