//! A replication-mode connection speaking only the simple query protocol.
//!
//! Connections opened with `replication=database` reject the extended
//! protocol that `tokio-postgres` relies on, so commands such as
//! `CREATE_REPLICATION_SLOT` go through this small frontend instead.

use std::str::FromStr;
use std::sync::Arc;

use bytes::BytesMut;
use fallible_iterator::FallibleIterator;
use postgres_protocol::authentication::{self, sasl};
use postgres_protocol::message::backend::{self, Message};
use postgres_protocol::message::frontend;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_postgres::config::{Config, Host};
use tracing::debug;

use crate::connect::{requires_tls, tls_config};
use crate::error::{PgError, PgResult};

const APPLICATION_NAME: &str = "litesync-replication";

trait SessionStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> SessionStream for T {}

/// Credentials and target of a replication session.
#[derive(Debug, Clone)]
pub struct StartupParams {
    pub user: String,
    pub password: Option<Vec<u8>>,
    pub database: String,
}

impl StartupParams {
    pub fn from_config(config: &Config) -> PgResult<Self> {
        let user = config
            .get_user()
            .ok_or_else(|| PgError::Connection("connection string has no user".to_string()))?
            .to_string();
        Ok(Self {
            database: config.get_dbname().unwrap_or(&user).to_string(),
            password: config.get_password().map(<[u8]>::to_vec),
            user,
        })
    }

    fn password(&self) -> PgResult<&[u8]> {
        self.password
            .as_deref()
            .ok_or_else(|| PgError::Connection("server requested a password".to_string()))
    }
}

/// One row of a simple query result. All values are text.
#[derive(Debug, Clone)]
pub struct SimpleRow {
    columns: Arc<[String]>,
    values: Vec<Option<String>>,
}

impl SimpleRow {
    /// Value of the named column; `None` if absent or NULL.
    pub fn get(&self, column: &str) -> Option<&str> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.values.get(index)?.as_deref()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// A `replication=database` session.
pub struct ReplicationSession {
    stream: Box<dyn SessionStream>,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl ReplicationSession {
    /// Connect using a libpq-style connection string or URI.
    pub async fn connect(connection_string: &str) -> PgResult<Self> {
        let config =
            Config::from_str(connection_string).map_err(|e| PgError::Connection(e.to_string()))?;
        let params = StartupParams::from_config(&config)?;

        let host = match config.get_hosts().first() {
            Some(Host::Tcp(host)) => host.clone(),
            None => "localhost".to_string(),
            #[allow(unreachable_patterns)]
            Some(_) => {
                return Err(PgError::Connection(
                    "replication sessions require a TCP host".to_string(),
                ))
            }
        };
        let port = config.get_ports().first().copied().unwrap_or(5432);

        debug!(host = %host, port, user = %params.user, "Opening replication session");
        let tcp = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| PgError::Connection(format!("{}:{}: {}", host, port, e)))?;
        tcp.set_nodelay(true)?;

        if requires_tls(connection_string) {
            let tls = negotiate_tls(tcp, &host).await?;
            Self::startup(tls, &params).await
        } else {
            Self::startup(tcp, &params).await
        }
    }

    /// Run the startup handshake over an established stream.
    pub async fn startup<S>(stream: S, params: &StartupParams) -> PgResult<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut session = ReplicationSession {
            stream: Box::new(stream),
            read_buf: BytesMut::with_capacity(8 * 1024),
            write_buf: BytesMut::with_capacity(1024),
        };

        let startup = [
            ("user", params.user.as_str()),
            ("database", params.database.as_str()),
            ("replication", "database"),
            ("client_encoding", "UTF8"),
            ("application_name", APPLICATION_NAME),
        ];
        frontend::startup_message(startup.iter().copied(), &mut session.write_buf)?;
        session.flush().await?;

        session.authenticate(params).await?;

        loop {
            match session.read_message().await? {
                Message::ReadyForQuery(_) => return Ok(session),
                Message::ErrorResponse(body) => return Err(error_response(&body)),
                _ => {}
            }
        }
    }

    async fn authenticate(&mut self, params: &StartupParams) -> PgResult<()> {
        let mut scram: Option<sasl::ScramSha256> = None;
        loop {
            match self.read_message().await? {
                Message::AuthenticationOk => return Ok(()),
                Message::AuthenticationCleartextPassword => {
                    frontend::password_message(params.password()?, &mut self.write_buf)?;
                    self.flush().await?;
                }
                Message::AuthenticationMd5Password(body) => {
                    let hash = authentication::md5_hash(
                        params.user.as_bytes(),
                        params.password()?,
                        body.salt(),
                    );
                    frontend::password_message(hash.as_bytes(), &mut self.write_buf)?;
                    self.flush().await?;
                }
                Message::AuthenticationSasl(body) => {
                    let mut mechanisms = body.mechanisms();
                    let mut supported = false;
                    while let Some(mechanism) = mechanisms.next()? {
                        supported |= mechanism == sasl::SCRAM_SHA_256;
                    }
                    if !supported {
                        return Err(PgError::Connection(
                            "server offered no supported SASL mechanism".to_string(),
                        ));
                    }
                    let state = sasl::ScramSha256::new(
                        params.password()?,
                        sasl::ChannelBinding::unsupported(),
                    );
                    frontend::sasl_initial_response(
                        sasl::SCRAM_SHA_256,
                        state.message(),
                        &mut self.write_buf,
                    )?;
                    self.flush().await?;
                    scram = Some(state);
                }
                Message::AuthenticationSaslContinue(body) => {
                    let state = scram.as_mut().ok_or_else(|| {
                        PgError::Protocol("SASL continue before SASL start".to_string())
                    })?;
                    state.update(body.data())?;
                    frontend::sasl_response(state.message(), &mut self.write_buf)?;
                    self.flush().await?;
                }
                Message::AuthenticationSaslFinal(body) => {
                    let state = scram.as_mut().ok_or_else(|| {
                        PgError::Protocol("SASL final before SASL start".to_string())
                    })?;
                    state.finish(body.data())?;
                }
                Message::ErrorResponse(body) => return Err(error_response(&body)),
                Message::NoticeResponse(_) => {}
                _ => {
                    return Err(PgError::Connection(
                        "unsupported authentication method".to_string(),
                    ))
                }
            }
        }
    }

    /// Run one statement through the simple query protocol and return the
    /// rows of its result, if any.
    pub async fn simple_query(&mut self, sql: &str) -> PgResult<Vec<SimpleRow>> {
        frontend::query(sql, &mut self.write_buf)?;
        self.flush().await?;

        let mut columns: Arc<[String]> = Arc::from(Vec::new());
        let mut rows = Vec::new();
        let mut error = None;
        loop {
            match self.read_message().await? {
                Message::RowDescription(body) => {
                    let names: Vec<String> = body
                        .fields()
                        .map(|f| Ok(f.name().to_string()))
                        .collect()?;
                    columns = names.into();
                }
                Message::DataRow(body) => {
                    let buffer = body.buffer();
                    let values: Vec<Option<String>> = body
                        .ranges()
                        .map(|range| {
                            Ok(range.map(|r| String::from_utf8_lossy(&buffer[r]).into_owned()))
                        })
                        .collect()?;
                    rows.push(SimpleRow {
                        columns: columns.clone(),
                        values,
                    });
                }
                Message::ErrorResponse(body) => error = Some(error_response(&body)),
                Message::CommandComplete(_)
                | Message::EmptyQueryResponse
                | Message::NoticeResponse(_)
                | Message::ParameterStatus(_) => {}
                Message::ReadyForQuery(_) => {
                    return match error {
                        Some(e) => Err(e),
                        None => Ok(rows),
                    }
                }
                _ => {
                    return Err(PgError::Protocol(
                        "unexpected message in simple query response".to_string(),
                    ))
                }
            }
        }
    }

    /// Send Terminate and shut the stream down.
    pub async fn close(mut self) -> PgResult<()> {
        frontend::terminate(&mut self.write_buf);
        self.flush().await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn flush(&mut self) -> PgResult<()> {
        self.stream.write_all(&self.write_buf).await?;
        self.write_buf.clear();
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_message(&mut self) -> PgResult<Message> {
        loop {
            if let Some(message) = backend::Message::parse(&mut self.read_buf)? {
                return Ok(message);
            }
            if self.stream.read_buf(&mut self.read_buf).await? == 0 {
                return Err(PgError::Connection(
                    "server closed the replication connection".to_string(),
                ));
            }
        }
    }
}

async fn negotiate_tls(
    mut tcp: TcpStream,
    host: &str,
) -> PgResult<tokio_rustls::client::TlsStream<TcpStream>> {
    let mut buf = BytesMut::new();
    frontend::ssl_request(&mut buf);
    tcp.write_all(&buf).await?;

    let mut response = [0u8; 1];
    tcp.read_exact(&mut response).await?;
    if response[0] != b'S' {
        return Err(PgError::Connection(
            "server does not support TLS".to_string(),
        ));
    }

    let connector = tokio_rustls::TlsConnector::from(Arc::new(tls_config()?));
    let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
        .map_err(|e| PgError::Connection(format!("invalid TLS server name {}: {}", host, e)))?;
    Ok(connector.connect(server_name, tcp).await?)
}

fn error_response(body: &backend::ErrorResponseBody) -> PgError {
    let mut severity = String::new();
    let mut code = String::new();
    let mut message = String::new();
    let mut fields = body.fields();
    while let Ok(Some(field)) = fields.next() {
        match field.type_() {
            b'S' => severity = field.value().to_string(),
            b'C' => code = field.value().to_string(),
            b'M' => message = field.value().to_string(),
            _ => {}
        }
    }
    PgError::database(
        &code,
        format!("{}: {} (code: {})", severity, message, code),
    )
}
