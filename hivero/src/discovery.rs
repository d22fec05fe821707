//! Coordination service endpoint discovery.
//!
//! HiveServer2 instances register themselves as ephemeral znodes under a
//! shared namespace; each znode's data is a `key=value;key=value` record
//! describing the endpoint. Discovery lists the namespace, picks one
//! registration at random for load spreading, reads its record and folds
//! it into the connection config.
use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::seq::SliceRandom;
use tokio::net::TcpStream;

use crate::{
    config::{Config, ConfigError, DiscoveryConfig},
    error::Result,
    thrift::ProtocolError,
    transport::Framed,
};

mod opcode {
    pub const GET_DATA: i32 = 4;
    pub const GET_CHILDREN: i32 = 8;
    pub const CLOSE: i32 = -11;
}

/// Resolve the endpoint for `config` through its coordination ensemble,
/// rewriting host and port in place.
pub(crate) async fn resolve(config: &mut Config) -> Result<()> {
    let Some(discovery) = config.discovery.clone() else { return Ok(()) };

    let mut zk = ZkClient::connect(&discovery).await?;
    let record = fetch_record(&mut zk, &discovery.namespace).await;
    zk.close().await;

    let record = record?;
    log::info!("discovered endpoint record {record:?}");
    config.apply_discovered(&parse_record(&record));
    Ok(())
}

/// List the namespace, pick one registration at random and read its record.
async fn fetch_record(zk: &mut ZkClient, namespace: &str) -> Result<String> {
    let path = format!("/{namespace}");
    let children = zk.children(&path).await?;
    let chosen = pick_registration(&children)?;
    zk.data(&format!("{path}/{chosen}")).await
}

fn pick_registration(children: &[String]) -> Result<&String> {
    children
        .choose(&mut rand::thread_rng())
        .ok_or_else(|| {
            ConfigError { reason: "no server registered under the discovery namespace".into() }
                .into()
        })
}

/// Split a `key=value;key=value` registration into a record. Whitespace is
/// trimmed, empty segments and segments without `=` are dropped.
fn parse_record(name: &str) -> BTreeMap<String, String> {
    let mut record = BTreeMap::new();
    for segment in name.split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        if let Some((key, value)) = segment.split_once('=') {
            record.insert(key.trim().to_owned(), value.trim().to_owned());
        }
    }
    record
}

fn underrun() -> ProtocolError {
    ProtocolError::new("truncated coordination service reply")
}

fn get_i32(buf: &mut Bytes) -> Result<i32, ProtocolError> {
    if buf.len() < 4 {
        return Err(underrun());
    }
    Ok(buf.get_i32())
}

fn get_i64(buf: &mut Bytes) -> Result<i64, ProtocolError> {
    if buf.len() < 8 {
        return Err(underrun());
    }
    Ok(buf.get_i64())
}

fn get_string(buf: &mut Bytes) -> Result<String, ProtocolError> {
    let len = get_i32(buf)?;
    let len = usize::try_from(len).map_err(|_| underrun())?;
    if buf.len() < len {
        return Err(underrun());
    }
    String::from_utf8(buf.split_to(len).to_vec())
        .map_err(|_| ProtocolError::new("non utf8 znode name"))
}

fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_i32(value.len() as i32);
    buf.put_slice(value.as_bytes());
}

/// Minimal coordination service client: handshake, list children, close.
/// Requests use the same length prefixed framing as the main protocol.
struct ZkClient {
    framed: Framed<TcpStream>,
    xid: i32,
}

impl ZkClient {
    /// Walk the ensemble until a member accepts the handshake, sleeping
    /// `retry_wait` and walking it once more before giving up.
    async fn connect(discovery: &DiscoveryConfig) -> Result<ZkClient> {
        let mut last_err = None;
        for attempt in 0..2 {
            if attempt > 0 {
                tokio::time::sleep(discovery.retry_wait).await;
            }
            for (host, port) in &discovery.ensemble {
                match Self::try_connect(host, *port, discovery).await {
                    Ok(client) => return Ok(client),
                    Err(err) => {
                        log::debug!("ensemble member {host}:{port} unavailable: {err}");
                        last_err = Some(err);
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            ConfigError { reason: "discovery ensemble is empty".into() }.into()
        }))
    }

    async fn try_connect(host: &str, port: u16, discovery: &DiscoveryConfig) -> Result<ZkClient> {
        let stream = TcpStream::connect((host, port)).await?;
        let mut framed = Framed::new(stream);

        let mut buf = BytesMut::with_capacity(44);
        buf.put_i32(0); // protocol version
        buf.put_i64(0); // last seen zxid
        buf.put_i32(discovery.session_timeout.as_millis() as i32);
        buf.put_i64(0); // session id, none yet
        buf.put_i32(16);
        buf.put_slice(&[0u8; 16]); // empty session password
        framed.send(&buf).await?;

        let mut reply = framed.recv().await?;
        let _protocol = get_i32(&mut reply)?;
        let _timeout = get_i32(&mut reply)?;
        let session_id = get_i64(&mut reply)?;
        log::debug!("coordination session {session_id:#x} via {host}:{port}");

        Ok(ZkClient { framed, xid: 1 })
    }

    /// Send one request and read its reply body, checking xid and error.
    async fn request(&mut self, op: i32, path: &str) -> Result<Bytes> {
        let xid = self.xid;
        self.xid += 1;

        let mut buf = BytesMut::with_capacity(16 + path.len());
        buf.put_i32(xid);
        buf.put_i32(op);
        put_string(&mut buf, path);
        buf.put_u8(0); // no watch
        self.framed.send(&buf).await?;

        let mut reply = self.framed.recv().await?;
        let reply_xid = get_i32(&mut reply)?;
        let _zxid = get_i64(&mut reply)?;
        let err = get_i32(&mut reply)?;
        if reply_xid != xid {
            return Err(ProtocolError::new("out of order coordination reply").into());
        }
        if err != 0 {
            return Err(ProtocolError::new(format!(
                "coordination service error {err} reading {path}"
            ))
            .into());
        }
        Ok(reply)
    }

    async fn children(&mut self, path: &str) -> Result<Vec<String>> {
        let mut reply = self.request(opcode::GET_CHILDREN, path).await?;
        let count = get_i32(&mut reply)?;
        let count = usize::try_from(count).unwrap_or(0);
        let mut children = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            children.push(get_string(&mut reply)?);
        }
        Ok(children)
    }

    /// Data of one znode; the trailing stat record is ignored.
    async fn data(&mut self, path: &str) -> Result<String> {
        let mut reply = self.request(opcode::GET_DATA, path).await?;
        Ok(get_string(&mut reply)?)
    }

    /// Best effort session close.
    async fn close(mut self) {
        let mut buf = BytesMut::with_capacity(8);
        buf.put_i32(self.xid);
        buf.put_i32(opcode::CLOSE);
        if let Err(err) = self.framed.send(&buf).await {
            log::debug!("coordination close failed: {err}");
            return;
        }
        let _ = self.framed.recv().await;
        let _ = self.framed.shutdown().await;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::ByteStr;

    #[test]
    fn parses_registration_record() {
        let record = parse_record(
            "serverUri=node7:10000;version=3.1.2; hive.server2.thrift.port=10000 ;;broken",
        );
        assert_eq!(record.get("serverUri").map(String::as_str), Some("node7:10000"));
        assert_eq!(record.get("version").map(String::as_str), Some("3.1.2"));
        assert_eq!(
            record.get("hive.server2.thrift.port").map(String::as_str),
            Some("10000"),
        );
        assert!(!record.contains_key("broken"));
        assert_eq!(record.len(), 3);
    }

    #[test]
    fn selection_stays_within_the_registered_set() {
        let children: Vec<String> = (0..5).map(|i| format!("serverUri=node{i}")).collect();

        for _ in 0..20 {
            let chosen = pick_registration(&children).unwrap();
            assert!(children.contains(chosen));
        }
    }

    #[test]
    fn empty_namespace_is_an_error() {
        assert!(pick_registration(&[]).is_err());
    }

    #[test]
    fn merge_does_not_touch_unrelated_settings() {
        let mut config = Config::default().username("etl").database("sales");
        let record = parse_record(
            "hive.server2.thrift.bind.host=node1;hive.server2.thrift.port=10013",
        );
        config.apply_discovered(&record);
        assert_eq!(config.host, "node1");
        assert_eq!(config.port, 10013);
        assert_eq!(config.username.as_deref(), Some("etl"));
        assert_eq!(config.database, Some(ByteStr::from_static("sales")));
    }
}
