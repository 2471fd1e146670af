//! TDS-backed sessions
//!
//! The production `SessionConnector`: opens a tiberius client against the
//! pool endpoint, authenticating with the tenant's bearer token (or an
//! explicit SQL login for fixtures), and adapts rows to the JSON shape the
//! rest of the gateway speaks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lakemux_core::{ConnectionDescriptor, GatewayError, SessionAuth};
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

use super::session::{QueryParam, SessionConnector, SqlRow, SqlSession};

type TdsClient = Client<Compat<TcpStream>>;

/// Opens TDS sessions from connection descriptors.
pub struct TdsConnector;

impl TdsConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TdsConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionConnector for TdsConnector {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
        token: Option<&str>,
    ) -> Result<Arc<dyn SqlSession>, GatewayError> {
        let mut config = Config::new();
        config.host(&descriptor.host);
        config.port(descriptor.port);
        config.database(&descriptor.database);
        config.application_name("lakemux");
        config.encryption(EncryptionLevel::Required);
        if descriptor.trust_cert {
            config.trust_cert();
        }

        match &descriptor.auth {
            SessionAuth::Bearer => {
                let token = token.ok_or_else(|| {
                    GatewayError::authentication("bearer session requested without a token")
                })?;
                config.authentication(AuthMethod::aad_token(token));
            }
            SessionAuth::SqlLogin { username, password } => {
                config.authentication(AuthMethod::sql_server(username, password));
            }
        }

        let connect_timeout = Duration::from_secs(descriptor.connect_timeout_secs);
        let addr = config.get_addr();

        let tcp = tokio::time::timeout(connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                GatewayError::transient(format!("connect to {} timed out", addr))
            })?
            .map_err(|e| GatewayError::connection(format!("tcp connect to {} failed: {}", addr, e)))?;
        tcp.set_nodelay(true)
            .map_err(|e| GatewayError::connection(format!("set_nodelay failed: {}", e)))?;

        let client = tokio::time::timeout(connect_timeout, Client::connect(config, tcp.compat_write()))
            .await
            .map_err(|_| GatewayError::transient(format!("handshake with {} timed out", addr)))?
            .map_err(classify_tds_error)?;

        info!(
            host = %descriptor.host,
            database = %descriptor.database,
            "[TdsConnector] Session established"
        );

        Ok(Arc::new(TdsSession {
            client: Mutex::new(Some(client)),
            ready: AtomicBool::new(true),
            request_timeout: Duration::from_secs(descriptor.request_timeout_secs),
        }))
    }
}

/// A live TDS session. The inner mutex serializes statements: one in
/// flight per session at a time.
pub struct TdsSession {
    client: Mutex<Option<TdsClient>>,
    ready: AtomicBool,
    request_timeout: Duration,
}

impl TdsSession {
    fn mark_failed(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl SqlSession for TdsSession {
    async fn execute(
        &self,
        statement: &str,
        params: &[QueryParam],
    ) -> Result<Vec<SqlRow>, GatewayError> {
        let mut guard = self.client.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| GatewayError::connection("session is closed"))?;

        let boxed: Vec<Box<dyn tiberius::ToSql>> = params.iter().map(param_to_sql).collect();
        let refs: Vec<&dyn tiberius::ToSql> = boxed.iter().map(AsRef::as_ref).collect();

        debug!(statement = %statement, params = params.len(), "[TdsSession] Executing statement");

        let result = tokio::time::timeout(self.request_timeout, async {
            let stream = client.query(statement, &refs).await?;
            stream.into_first_result().await
        })
        .await;

        let rows = match result {
            Ok(Ok(rows)) => rows,
            Ok(Err(err)) => {
                let classified = classify_tds_error(err);
                if matches!(classified, GatewayError::Connection { .. }) {
                    self.mark_failed();
                }
                return Err(classified);
            }
            Err(_) => {
                // A timed-out statement leaves the stream in an unknown
                // state; the session cannot be reused.
                self.mark_failed();
                return Err(GatewayError::transient(format!(
                    "statement timed out after {:?}",
                    self.request_timeout
                )));
            }
        };

        rows.into_iter().map(row_to_json).collect()
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.mark_failed();
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.take() {
            if let Err(err) = client.close().await {
                debug!("[TdsSession] Close returned error: {}", err);
            }
        }
    }
}

fn param_to_sql(param: &QueryParam) -> Box<dyn tiberius::ToSql> {
    match param {
        QueryParam::Text(s) => Box::new(s.clone()),
        QueryParam::Int(i) => Box::new(*i),
        QueryParam::Float(f) => Box::new(*f),
        QueryParam::Bool(b) => Box::new(*b),
        QueryParam::Timestamp(ts) => Box::new(ts.naive_utc()),
        QueryParam::Null => Box::new(Option::<String>::None),
    }
}

fn row_to_json(row: tiberius::Row) -> Result<SqlRow, GatewayError> {
    let names: Vec<String> = row
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            if column.name().is_empty() {
                format!("column{}", idx)
            } else {
                column.name().to_string()
            }
        })
        .collect();

    let mut out = SqlRow::new();
    for (name, data) in names.into_iter().zip(row.into_iter()) {
        out.insert(name, column_data_to_json(data));
    }
    Ok(out)
}

fn column_data_to_json(data: ColumnData<'static>) -> serde_json::Value {
    use serde_json::Value;

    match data {
        ColumnData::Bit(v) => v.map(Value::Bool).unwrap_or(Value::Null),
        ColumnData::U8(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I16(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I32(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I64(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::F32(v) => float_value(v.map(f64::from)),
        ColumnData::F64(v) => float_value(v),
        ColumnData::Numeric(v) => float_value(v.map(f64::from)),
        ColumnData::String(v) => v
            .map(|s| Value::String(s.into_owned()))
            .unwrap_or(Value::Null),
        ColumnData::Guid(v) => v.map(|g| Value::String(g.to_string())).unwrap_or(Value::Null),
        ColumnData::Binary(v) => v
            .map(|b| Value::String(hex::encode(b.as_ref())))
            .unwrap_or(Value::Null),
        ColumnData::Xml(v) => v.map(|x| Value::String(x.to_string())).unwrap_or(Value::Null),
        dt @ ColumnData::DateTime(_) => decode_temporal::<chrono::NaiveDateTime>(&dt, |v| {
            v.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
        }),
        dt @ ColumnData::SmallDateTime(_) => decode_temporal::<chrono::NaiveDateTime>(&dt, |v| {
            v.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
        }),
        dt @ ColumnData::DateTime2(_) => decode_temporal::<chrono::NaiveDateTime>(&dt, |v| {
            v.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
        }),
        d @ ColumnData::Date(_) => {
            decode_temporal::<chrono::NaiveDate>(&d, |v| v.format("%Y-%m-%d").to_string())
        }
        t @ ColumnData::Time(_) => {
            decode_temporal::<chrono::NaiveTime>(&t, |v| v.format("%H:%M:%S%.3f").to_string())
        }
        dto @ ColumnData::DateTimeOffset(_) => {
            match chrono::DateTime::<chrono::Utc>::from_sql(&dto) {
                Ok(Some(v)) => serde_json::Value::String(v.to_rfc3339()),
                Ok(None) => serde_json::Value::Null,
                Err(err) => {
                    warn!("[TdsSession] Undecodable datetimeoffset: {}", err);
                    serde_json::Value::Null
                }
            }
        }
    }
}

fn float_value(v: Option<f64>) -> serde_json::Value {
    v.and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

fn decode_temporal<'a, T>(
    data: &'a ColumnData<'static>,
    render: impl Fn(T) -> String,
) -> serde_json::Value
where
    T: FromSql<'a>,
{
    match T::from_sql(data) {
        Ok(Some(v)) => serde_json::Value::String(render(v)),
        Ok(None) => serde_json::Value::Null,
        Err(err) => {
            warn!("[TdsSession] Undecodable temporal value: {}", err);
            serde_json::Value::Null
        }
    }
}

/// Map driver failures onto the gateway taxonomy.
///
/// Server-raised errors are the caller's problem except for the login
/// family; transport failures kill the session.
fn classify_tds_error(err: tiberius::error::Error) -> GatewayError {
    use tiberius::error::Error;

    match err {
        Error::Server(token) => {
            let message = format!("server error {}: {}", token.code(), token.message());
            match token.code() {
                // Login / token failures
                18456 | 18452 | 18461 => GatewayError::authentication(message),
                _ => GatewayError::ClientRequest {
                    status: None,
                    message,
                },
            }
        }
        Error::Io { message, .. } => GatewayError::connection(format!("io error: {}", message)),
        Error::Tls(message) => GatewayError::connection(format!("tls error: {}", message)),
        Error::Routing { host, port } => {
            GatewayError::transient(format!("server redirected to {}:{}", host, port))
        }
        other => GatewayError::connection(other.to_string()),
    }
}
