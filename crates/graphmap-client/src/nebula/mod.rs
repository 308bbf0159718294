//! graphd over TCP: framed thrift compact messages.
//!
//! Each session owns one connection. It sends `verifyClientVersion`, then
//! `authenticate`, then one `execute` per statement, and a one-way
//! `signout` on release. Frames are a 4-byte big-endian length followed by
//! the message.

pub mod compact;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::NaiveDate;
use indexmap::IndexMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use graphmap_core::{GraphConfig, Record, Value};

use crate::client::GraphClient;
use crate::transport::{
    Cell, Dialer, GraphService, GraphSession, ResultSet, TransportError, VertexData, E_SUCCEEDED,
};
use compact::{wire, Decoder, Encoder, MessageType, ProtocolError};

/// Client version announced in `verifyClientVersion`.
pub const CLIENT_VERSION: &str = "3.0.0";

const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

impl From<ProtocolError> for TransportError {
    fn from(e: ProtocolError) -> Self {
        TransportError::Protocol(e.to_string())
    }
}

fn io_error(e: std::io::Error) -> TransportError {
    TransportError::Io(e.to_string())
}

// ── Dialer / service / session ───────────────────────────────────

/// Dials a graphd server at `GraphConfig::address()`.
#[derive(Debug, Clone)]
pub struct NebulaDialer {
    client_version: String,
}

impl Default for NebulaDialer {
    fn default() -> Self {
        Self::new(CLIENT_VERSION)
    }
}

impl NebulaDialer {
    pub fn new(client_version: impl Into<String>) -> Self {
        Self {
            client_version: client_version.into(),
        }
    }
}

#[async_trait]
impl Dialer for NebulaDialer {
    /// Opens one connection to check that the server is up and accepts our
    /// client version. Sessions open their own connections.
    async fn dial(&self, config: &GraphConfig) -> Result<Arc<dyn GraphService>, TransportError> {
        let address = config.address();
        let mut connection = Connection::open(&address).await?;
        connection.verify_version(&self.client_version).await?;
        tracing::debug!(address = %address, version = %self.client_version, "graphd accepted client");
        Ok(Arc::new(NebulaService {
            address,
            client_version: self.client_version.clone(),
        }))
    }
}

struct NebulaService {
    address: String,
    client_version: String,
}

#[async_trait]
impl GraphService for NebulaService {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Box<dyn GraphSession>, TransportError> {
        let mut connection = Connection::open(&self.address).await?;
        connection.verify_version(&self.client_version).await?;
        let session_id = connection.authenticate(username, password).await?;
        tracing::debug!(address = %self.address, session_id, "Authenticated graphd session");
        Ok(Box::new(NebulaSession {
            connection: Some(connection),
            session_id,
        }))
    }
}

struct NebulaSession {
    connection: Option<Connection>,
    session_id: i64,
}

#[async_trait]
impl GraphSession for NebulaSession {
    async fn execute(&mut self, statement: &str) -> Result<ResultSet, TransportError> {
        let connection = self.connection.as_mut().ok_or(TransportError::SessionClosed)?;
        connection.execute(self.session_id, statement).await
    }

    fn release(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };
        let session_id = self.session_id;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = connection.signout(session_id).await {
                        tracing::warn!(session_id, error = %e, "Failed to sign out graphd session");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(session_id, "No runtime to sign out graphd session, leaving it to expire");
            }
        }
    }
}

impl GraphClient {
    /// A client for the graphd server named by `config`.
    pub fn nebula(config: GraphConfig) -> Self {
        GraphClient::new(config, Arc::new(NebulaDialer::default()))
    }
}

// ── Connection ───────────────────────────────────────────────────

struct Connection {
    stream: TcpStream,
    address: String,
    seq: i32,
    // Set while a request awaits its reply. Still set at the next call means
    // the previous caller was cancelled and the stream is out of step.
    in_flight: bool,
}

impl Connection {
    async fn open(address: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| TransportError::Dial {
                address: address.to_string(),
                message: e.to_string(),
            })?;
        stream.set_nodelay(true).map_err(io_error)?;
        Ok(Self {
            stream,
            address: address.to_string(),
            seq: 0,
            in_flight: false,
        })
    }

    async fn verify_version(&mut self, version: &str) -> Result<(), TransportError> {
        let mut reply = self
            .call("verifyClientVersion", |args| {
                args.field_struct_begin(1);
                args.field_binary(1, version.as_bytes());
                args.struct_end();
            })
            .await?;
        let status = read_success(&mut reply, "verifyClientVersion", read_status)?;
        if status.code != E_SUCCEEDED {
            return Err(TransportError::Dial {
                address: self.address.clone(),
                message: status
                    .message
                    .unwrap_or_else(|| format!("client version {version} rejected")),
            });
        }
        Ok(())
    }

    async fn authenticate(&mut self, username: &str, password: &str) -> Result<i64, TransportError> {
        let mut reply = self
            .call("authenticate", |args| {
                args.field_binary(1, username.as_bytes());
                args.field_binary(2, password.as_bytes());
            })
            .await?;
        let status = read_success(&mut reply, "authenticate", read_status)?;
        match (status.code, status.session_id) {
            (E_SUCCEEDED, Some(id)) => Ok(id),
            (E_SUCCEEDED, None) => Err(TransportError::Protocol(
                "authenticate reply carries no session id".to_string(),
            )),
            (code, _) => Err(TransportError::Auth(
                status.message.unwrap_or_else(|| format!("error code {code}")),
            )),
        }
    }

    async fn execute(&mut self, session_id: i64, statement: &str) -> Result<ResultSet, TransportError> {
        let mut reply = self
            .call("execute", |args| {
                args.field_i64(1, session_id);
                args.field_binary(2, statement.as_bytes());
            })
            .await?;
        read_success(&mut reply, "execute", read_execution_response)
    }

    async fn signout(&mut self, session_id: i64) -> Result<(), TransportError> {
        self.send("signout", MessageType::Oneway, |args| args.field_i64(1, session_id))
            .await
            .map(|_| ())
    }

    async fn call(
        &mut self,
        method: &str,
        args: impl FnOnce(&mut Encoder),
    ) -> Result<Decoder, TransportError> {
        let seq = self.send(method, MessageType::Call, args).await?;
        let mut reply = Decoder::new(self.receive().await?);
        self.in_flight = false;

        let header = reply.message_header()?;
        if header.kind == MessageType::Exception {
            let message = read_application_exception(&mut reply)?;
            return Err(TransportError::Protocol(format!("{method} raised: {message}")));
        }
        if header.kind != MessageType::Reply || header.name != method || header.seq != seq {
            return Err(TransportError::Protocol(format!(
                "expected reply to {method} #{seq}, got {:?} {} #{}",
                header.kind, header.name, header.seq
            )));
        }
        Ok(reply)
    }

    async fn send(
        &mut self,
        method: &str,
        kind: MessageType,
        args: impl FnOnce(&mut Encoder),
    ) -> Result<i32, TransportError> {
        if self.in_flight {
            return Err(TransportError::Protocol(format!(
                "connection to {} was interrupted mid-request",
                self.address
            )));
        }
        self.seq = self.seq.wrapping_add(1);
        let mut message = Encoder::message(method, kind, self.seq);
        message.struct_begin();
        args(&mut message);
        message.struct_end();
        let body = message.into_bytes();

        let len = u32::try_from(body.len())
            .map_err(|_| TransportError::Protocol(format!("{method} request too large")))?;
        let mut frame = BytesMut::with_capacity(4 + body.len());
        frame.put_u32(len);
        frame.put_slice(&body);

        self.in_flight = true;
        self.stream.write_all(&frame).await.map_err(io_error)?;
        if kind == MessageType::Oneway {
            self.in_flight = false;
        }
        Ok(self.seq)
    }

    async fn receive(&mut self) -> Result<Bytes, TransportError> {
        let len = self.stream.read_u32().await.map_err(io_error)? as usize;
        if len > MAX_FRAME_LEN {
            return Err(TransportError::Protocol(format!("reply frame of {len} bytes")));
        }
        let mut body = BytesMut::zeroed(len);
        self.stream.read_exact(&mut body).await.map_err(io_error)?;
        Ok(body.freeze())
    }
}

// ── Reply decoding ───────────────────────────────────────────────

/// Reads the `success` field (id 0) of a reply's result struct.
fn read_success<T>(
    reply: &mut Decoder,
    method: &str,
    mut read: impl FnMut(&mut Decoder) -> Result<T, ProtocolError>,
) -> Result<T, TransportError> {
    let mut success = None;
    reply.struct_begin()?;
    while let Some((id, ty)) = reply.field()? {
        if id == 0 && ty == wire::STRUCT {
            success = Some(read(reply)?);
        } else {
            reply.skip(ty)?;
        }
    }
    reply.struct_end();
    success.ok_or_else(|| TransportError::Protocol(format!("{method} reply carries no result")))
}

fn read_application_exception(d: &mut Decoder) -> Result<String, ProtocolError> {
    let mut message = String::new();
    d.struct_begin()?;
    while let Some((id, ty)) = d.field()? {
        match (id, ty) {
            (1, wire::BINARY) => message = d.read_string()?,
            _ => d.skip(ty)?,
        }
    }
    d.struct_end();
    Ok(message)
}

/// Shared shape of `VerifyClientVersionResp` and `AuthResponse`.
struct Status {
    code: i32,
    message: Option<String>,
    session_id: Option<i64>,
}

fn read_status(d: &mut Decoder) -> Result<Status, ProtocolError> {
    let mut status = Status {
        code: E_SUCCEEDED,
        message: None,
        session_id: None,
    };
    d.struct_begin()?;
    while let Some((id, ty)) = d.field()? {
        match (id, ty) {
            (1, wire::I32) => status.code = d.read_i32()?,
            (2, wire::BINARY) => status.message = Some(d.read_string()?),
            (3, wire::I64) => status.session_id = Some(d.read_i64()?),
            _ => d.skip(ty)?,
        }
    }
    d.struct_end();
    Ok(status)
}

fn read_execution_response(d: &mut Decoder) -> Result<ResultSet, ProtocolError> {
    let mut code = E_SUCCEEDED;
    let mut message = None;
    let mut data = None;
    d.struct_begin()?;
    while let Some((id, ty)) = d.field()? {
        match (id, ty) {
            (1, wire::I32) => code = d.read_i32()?,
            (3, wire::STRUCT) => data = Some(read_data_set(d)?),
            (5, wire::BINARY) => message = Some(d.read_string()?),
            _ => d.skip(ty)?,
        }
    }
    d.struct_end();

    Ok(if code != E_SUCCEEDED {
        ResultSet::failure(code, message.unwrap_or_default())
    } else {
        match data {
            Some((columns, rows)) => ResultSet::with_rows(columns, rows),
            None => ResultSet::empty(),
        }
    })
}

fn read_list<T>(
    d: &mut Decoder,
    elem: u8,
    mut read: impl FnMut(&mut Decoder) -> Result<T, ProtocolError>,
) -> Result<Vec<T>, ProtocolError> {
    let (found, len) = d.list_begin()?;
    d.expect_elements(elem, found, len)?;
    (0..len).map(|_| read(d)).collect()
}

fn read_map<T>(
    d: &mut Decoder,
    mut read: impl FnMut(&mut Decoder) -> Result<T, ProtocolError>,
) -> Result<IndexMap<String, T>, ProtocolError> {
    let (key, value, len) = d.map_begin()?;
    d.expect_elements(wire::BINARY, key, len)?;
    d.expect_elements(wire::STRUCT, value, len)?;
    let mut out = IndexMap::with_capacity(len);
    for _ in 0..len {
        let name = d.read_string()?;
        out.insert(name, read(d)?);
    }
    Ok(out)
}

fn read_data_set(d: &mut Decoder) -> Result<(Vec<String>, Vec<Vec<Cell>>), ProtocolError> {
    let mut columns = Vec::new();
    let mut rows = Vec::new();
    d.struct_begin()?;
    while let Some((id, ty)) = d.field()? {
        match (id, ty) {
            (1, wire::LIST) => columns = read_list(d, wire::BINARY, Decoder::read_string)?,
            (2, wire::LIST) => rows = read_list(d, wire::STRUCT, read_row)?,
            _ => d.skip(ty)?,
        }
    }
    d.struct_end();
    Ok((columns, rows))
}

fn read_row(d: &mut Decoder) -> Result<Vec<Cell>, ProtocolError> {
    let mut cells = Vec::new();
    d.struct_begin()?;
    while let Some((id, ty)) = d.field()? {
        match (id, ty) {
            (1, wire::LIST) => cells = read_list(d, wire::STRUCT, read_cell)?,
            _ => d.skip(ty)?,
        }
    }
    d.struct_end();
    Ok(cells)
}

/// One `Value` union. Kinds without a [`Value`] counterpart (paths,
/// geography, durations) read as null.
fn read_cell(d: &mut Decoder) -> Result<Cell, ProtocolError> {
    let mut cell = Cell::Value(Value::Null);
    d.struct_begin()?;
    while let Some((id, ty)) = d.field()? {
        cell = match (id, ty) {
            (2, wire::BOOL_TRUE | wire::BOOL_FALSE) => Cell::Value(Value::Bool(d.read_bool()?)),
            (3, wire::I64) => Cell::Value(Value::Int(d.read_i64()?)),
            (4, wire::DOUBLE) => Cell::Value(Value::Float(d.read_double()?)),
            (5, wire::BINARY) => Cell::Value(Value::String(d.read_string()?)),
            (6, wire::STRUCT) => Cell::Value(read_date(d)?),
            (7, wire::STRUCT) => Cell::Value(read_time(d)?),
            (8, wire::STRUCT) => Cell::Value(read_datetime(d)?),
            (9, wire::STRUCT) => Cell::Vertex(read_vertex(d)?),
            (10, wire::STRUCT) => Cell::Value(read_edge(d)?),
            (12 | 14, wire::STRUCT) => Cell::Value(Value::List(read_collection(d)?)),
            (13, wire::STRUCT) => Cell::Value(Value::Map(read_map_value(d)?)),
            _ => {
                d.skip(ty)?;
                Cell::Value(Value::Null)
            }
        };
    }
    d.struct_end();
    Ok(cell)
}

/// A nested value. Vertices inside collections collapse to their id.
fn read_value(d: &mut Decoder) -> Result<Value, ProtocolError> {
    Ok(match read_cell(d)? {
        Cell::Value(value) => value,
        Cell::Vertex(vertex) => Value::String(vertex.vid),
    })
}

fn read_byte_u32(d: &mut Decoder) -> Result<u32, ProtocolError> {
    Ok(u32::from(d.read_byte()? as u8))
}

fn read_date(d: &mut Decoder) -> Result<Value, ProtocolError> {
    let (mut year, mut month, mut day) = (1970, 1, 1);
    d.struct_begin()?;
    while let Some((id, ty)) = d.field()? {
        match (id, ty) {
            (1, wire::I16) => year = i32::from(d.read_i16()?),
            (2, wire::BYTE) => month = read_byte_u32(d)?,
            (3, wire::BYTE) => day = read_byte_u32(d)?,
            _ => d.skip(ty)?,
        }
    }
    d.struct_end();
    Ok(NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map_or(Value::Null, Value::Timestamp))
}

fn read_time(d: &mut Decoder) -> Result<Value, ProtocolError> {
    let (mut hour, mut minute, mut sec, mut micros) = (0, 0, 0, 0);
    d.struct_begin()?;
    while let Some((id, ty)) = d.field()? {
        match (id, ty) {
            (1, wire::BYTE) => hour = read_byte_u32(d)?,
            (2, wire::BYTE) => minute = read_byte_u32(d)?,
            (3, wire::BYTE) => sec = read_byte_u32(d)?,
            (4, wire::I32) => micros = d.read_i32()?,
            _ => d.skip(ty)?,
        }
    }
    d.struct_end();
    Ok(Value::String(format!("{hour:02}:{minute:02}:{sec:02}.{micros:06}")))
}

fn read_datetime(d: &mut Decoder) -> Result<Value, ProtocolError> {
    let (mut year, mut month, mut day) = (1970, 1, 1);
    let (mut hour, mut minute, mut sec, mut micros) = (0, 0, 0, 0u32);
    d.struct_begin()?;
    while let Some((id, ty)) = d.field()? {
        match (id, ty) {
            (1, wire::I16) => year = i32::from(d.read_i16()?),
            (2, wire::BYTE) => month = read_byte_u32(d)?,
            (3, wire::BYTE) => day = read_byte_u32(d)?,
            (4, wire::BYTE) => hour = read_byte_u32(d)?,
            (5, wire::BYTE) => minute = read_byte_u32(d)?,
            (6, wire::BYTE) => sec = read_byte_u32(d)?,
            (7, wire::I32) => micros = u32::try_from(d.read_i32()?).unwrap_or(u32::MAX),
            _ => d.skip(ty)?,
        }
    }
    d.struct_end();
    Ok(NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_micro_opt(hour, minute, sec, micros))
        .map_or(Value::Null, Value::Timestamp))
}

fn vid_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Int(i) => i.to_string(),
        Value::Null => String::new(),
        other => format!("{other:?}"),
    }
}

fn read_vertex(d: &mut Decoder) -> Result<VertexData, ProtocolError> {
    let mut vertex = VertexData {
        vid: String::new(),
        tags: IndexMap::new(),
    };
    d.struct_begin()?;
    while let Some((id, ty)) = d.field()? {
        match (id, ty) {
            (1, wire::STRUCT) => vertex.vid = vid_text(read_value(d)?),
            (2, wire::LIST) => vertex.tags = read_list(d, wire::STRUCT, read_tag)?.into_iter().collect(),
            _ => d.skip(ty)?,
        }
    }
    d.struct_end();
    Ok(vertex)
}

fn read_tag(d: &mut Decoder) -> Result<(String, Record), ProtocolError> {
    let mut name = String::new();
    let mut props = Record::new();
    d.struct_begin()?;
    while let Some((id, ty)) = d.field()? {
        match (id, ty) {
            (1, wire::BINARY) => name = d.read_string()?,
            (2, wire::MAP) => props = read_map(d, read_value)?,
            _ => d.skip(ty)?,
        }
    }
    d.struct_end();
    Ok((name, props))
}

/// An edge as a map: `src`, `dst`, `name`, `ranking` and `props`.
fn read_edge(d: &mut Decoder) -> Result<Value, ProtocolError> {
    let mut edge = Record::new();
    d.struct_begin()?;
    while let Some((id, ty)) = d.field()? {
        match (id, ty) {
            (1, wire::STRUCT) => {
                edge.insert("src".to_string(), read_value(d)?);
            }
            (2, wire::STRUCT) => {
                edge.insert("dst".to_string(), read_value(d)?);
            }
            (4, wire::BINARY) => {
                edge.insert("name".to_string(), Value::String(d.read_string()?));
            }
            (5, wire::I64) => {
                edge.insert("ranking".to_string(), Value::Int(d.read_i64()?));
            }
            (6, wire::MAP) => {
                edge.insert("props".to_string(), Value::Map(read_map(d, read_value)?));
            }
            _ => d.skip(ty)?,
        }
    }
    d.struct_end();
    Ok(Value::Map(edge))
}

/// `NList` and `NSet`: a struct around one collection of values.
fn read_collection(d: &mut Decoder) -> Result<Vec<Value>, ProtocolError> {
    let mut values = Vec::new();
    d.struct_begin()?;
    while let Some((id, ty)) = d.field()? {
        match (id, ty) {
            (1, wire::LIST | wire::SET) => values = read_list(d, wire::STRUCT, read_value)?,
            _ => d.skip(ty)?,
        }
    }
    d.struct_end();
    Ok(values)
}

fn read_map_value(d: &mut Decoder) -> Result<Record, ProtocolError> {
    let mut map = Record::new();
    d.struct_begin()?;
    while let Some((id, ty)) = d.field()? {
        match (id, ty) {
            (1, wire::MAP) => map = read_map(d, read_value)?,
            _ => d.skip(ty)?,
        }
    }
    d.struct_end();
    Ok(map)
}
