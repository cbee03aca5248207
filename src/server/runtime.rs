//! Runtime - listeners and per-connection drivers
//!
//! The runtime is responsible for:
//! - Binding one listener per configured `listen` entry
//! - Driving a [`ConnectionHandler`] per accepted client
//! - Turning commands into socket operations and socket activity into events
//! - Shutting everything down on Ctrl-C

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn, Level};

use crate::common::{Address, Connection, ConnectionId, TransportProtocol};
use crate::config::{Config, ListenConfig, Options};
use crate::error::{Error, Result};
use crate::proxy::{Command, CommandKind, ProxyMode, Reply, Services};
use crate::transport::{Accepted, Listener, Stream, TcpTransport, Transport};

use super::ConnectionHandler;

const READ_BUFFER_SIZE: usize = 16 * 1024;
const INPUT_QUEUE_SIZE: usize = 64;

/// Runtime manages the proxy lifecycle
pub struct Runtime {
    listeners: Vec<ListenConfig>,
    options: Arc<Options>,
    services: Arc<Services>,
    transport: Arc<dyn Transport>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Runtime {
    /// Build runtime from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        for listen in &config.listen {
            if listen.mode.transport() == TransportProtocol::Udp {
                return Err(Error::Unsupported(format!(
                    "[{}] {} needs a UDP listener, only TCP listeners are served",
                    listen.tag, listen.mode
                )));
            }
        }
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            listeners: config.listen.clone(),
            options: Arc::new(config.options()?),
            services: Arc::new(Services::default()),
            transport: Arc::new(TcpTransport::new()),
            shutdown_tx,
        })
    }

    /// Builder: plug in another router or layer factory
    pub fn with_services(mut self, services: Services) -> Self {
        self.services = Arc::new(services);
        self
    }

    /// Run until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        let mut handles = Vec::new();
        for listen in &self.listeners {
            let address: Address = listen.listen.parse()?;
            let listener = self.transport.bind(&address).await?;
            info!(
                "[{}] Listening on {} (mode: {})",
                listen.tag,
                listener.local_addr()?,
                listen.mode
            );
            let serve = Serve {
                tag: listen.tag.clone(),
                mode: listen.mode.clone(),
                options: self.options.clone(),
                services: self.services.clone(),
                transport: self.transport.clone(),
                shutdown_tx: self.shutdown_tx.clone(),
            };
            handles.push(tokio::spawn(run_listener(listener, serve)));
        }

        info!("Runtime started with {} listeners", handles.len());

        tokio::signal::ctrl_c().await?;
        info!("Shutting down...");
        let _ = self.shutdown_tx.send(());

        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }
}

/// Everything a listener hands to its connections
#[derive(Clone)]
struct Serve {
    tag: String,
    mode: ProxyMode,
    options: Arc<Options>,
    services: Arc<Services>,
    transport: Arc<dyn Transport>,
    shutdown_tx: broadcast::Sender<()>,
}

async fn run_listener(listener: Box<dyn Listener>, serve: Serve) {
    let mut shutdown_rx = serve.shutdown_tx.subscribe();
    let mut conn_count: u64 = 0;

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok(accepted) => {
                        conn_count += 1;
                        let conn_id = conn_count;
                        debug!("[{}] New connection #{} from {}", serve.tag, conn_id, accepted.peer);
                        let serve = serve.clone();
                        tokio::spawn(async move {
                            let peer = accepted.peer.clone();
                            if let Err(e) = handle_connection(serve, accepted).await {
                                warn!("Connection #{} from {} error: {}", conn_id, peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("[{}] Accept error: {}", serve.tag, e);
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("[{}] Shutting down (handled {} connections)", serve.tag, conn_count);
                break;
            }
        }
    }
}

async fn handle_connection(serve: Serve, accepted: Accepted) -> Result<()> {
    let Accepted { stream, peer, local } = accepted;
    let mut client = Connection::client(peer, local.clone(), TransportProtocol::Tcp);
    if serve.mode == ProxyMode::Transparent {
        client = client.with_original_destination(local);
    }
    let handler = ConnectionHandler::new(client, serve.mode, serve.options, serve.services)?;
    drive_connection(handler, stream, serve.transport, serve.shutdown_tx.subscribe()).await
}

/// Socket activity reported to the driver loop
enum Input {
    Data(ConnectionId, Bytes),
    Closed(ConnectionId),
    Opened(Command, std::result::Result<Stream, String>),
    Woken(Command),
}

struct Driver {
    handler: ConnectionHandler,
    transport: Arc<dyn Transport>,
    tx: mpsc::Sender<Input>,
    writers: HashMap<ConnectionId, WriteHalf<Stream>>,
    readers: HashMap<ConnectionId, JoinHandle<()>>,
}

/// Run one client connection through `handler` until every side is closed
pub async fn drive_connection(
    handler: ConnectionHandler,
    client: Stream,
    transport: Arc<dyn Transport>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(INPUT_QUEUE_SIZE);
    let client_id = handler.client();
    let mut driver = Driver {
        handler,
        transport,
        tx,
        writers: HashMap::new(),
        readers: HashMap::new(),
    };
    driver.attach(client_id, client);

    let result = driver.run(&mut rx, &mut shutdown_rx).await;
    for reader in driver.readers.values() {
        reader.abort();
    }
    result
}

impl Driver {
    async fn run(
        &mut self,
        rx: &mut mpsc::Receiver<Input>,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<()> {
        let commands = self.handler.start()?;
        self.apply(commands).await;

        while !self.handler.is_finished() {
            let input = tokio::select! {
                input = rx.recv() => match input {
                    Some(input) => input,
                    None => break,
                },
                _ = shutdown_rx.recv() => break,
            };
            let commands = match input {
                Input::Data(connection, data) => {
                    if !self.readable(connection) {
                        continue;
                    }
                    self.handler.data_received(connection, data)?
                }
                Input::Closed(connection) => {
                    if !self.readable(connection) {
                        continue;
                    }
                    self.handler.connection_closed(connection)?
                }
                Input::Opened(command, Ok(stream)) => {
                    if let CommandKind::OpenConnection { connection } = command.kind {
                        self.attach(connection, stream);
                    }
                    self.handler.complete(command, Reply::OpenConnection(None))?
                }
                Input::Opened(command, Err(err)) => {
                    self.handler.complete(command, Reply::OpenConnection(Some(err)))?
                }
                Input::Woken(command) => self.handler.complete(command, Reply::Wakeup)?,
            };
            self.apply(commands).await;
        }
        Ok(())
    }

    /// Reads racing a full close are dropped
    fn readable(&self, connection: ConnectionId) -> bool {
        self.handler.connections()[connection].state.can_read()
    }

    fn attach(&mut self, connection: ConnectionId, stream: Stream) {
        let (reader, writer) = tokio::io::split(stream);
        self.writers.insert(connection, writer);
        let reader = tokio::spawn(read_loop(connection, reader, self.tx.clone()));
        self.readers.insert(connection, reader);
    }

    async fn apply(&mut self, commands: Vec<Command>) {
        for command in commands {
            self.execute(command).await;
        }
    }

    async fn execute(&mut self, command: Command) {
        match &command.kind {
            CommandKind::OpenConnection { connection } => {
                let address = self.handler.connections()[*connection].address.clone();
                let transport = self.transport.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = match address {
                        Some(address) => transport.connect(&address).await.map_err(|e| e.to_string()),
                        None => Err("no destination address".to_string()),
                    };
                    let _ = tx.send(Input::Opened(command, result)).await;
                });
            }
            CommandKind::SendData { connection, data } => {
                if let Some(writer) = self.writers.get_mut(connection) {
                    if let Err(e) = writer.write_all(data).await {
                        debug!("[runtime] write to {} failed: {}", connection, e);
                    }
                }
            }
            CommandKind::CloseConnection { connection, half_close: true } => {
                if let Some(writer) = self.writers.get_mut(connection) {
                    let _ = writer.shutdown().await;
                }
            }
            CommandKind::CloseConnection { connection, half_close: false } => {
                if let Some(mut writer) = self.writers.remove(connection) {
                    let _ = writer.shutdown().await;
                }
                if let Some(reader) = self.readers.remove(connection) {
                    reader.abort();
                }
            }
            CommandKind::RequestWakeup { delay } => {
                let delay = *delay;
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Input::Woken(command)).await;
                });
            }
            CommandKind::Log { level, message } => log(*level, message),
            CommandKind::Quic(quic) => {
                warn!("[runtime] No QUIC stack available, dropping {:?}", quic);
            }
        }
    }
}

async fn read_loop(connection: ConnectionId, mut reader: ReadHalf<Stream>, tx: mpsc::Sender<Input>) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                trace!("[runtime] {} read {} bytes", connection, n);
                if tx.send(Input::Data(connection, Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!("[runtime] read from {} failed: {}", connection, e);
                break;
            }
        }
    }
    let _ = tx.send(Input::Closed(connection)).await;
}

fn log(level: Level, message: &str) {
    if level == Level::ERROR {
        error!("{}", message);
    } else if level == Level::WARN {
        warn!("{}", message);
    } else if level == Level::INFO {
        info!("{}", message);
    } else if level == Level::DEBUG {
        debug!("{}", message);
    } else {
        trace!("{}", message);
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn test_udp_listeners_are_rejected() {
        let config = Config::from_json(
            r#"{"listen": [{"tag": "dns-in", "listen": "127.0.0.1:5353", "mode": "reverse:dns://192.0.2.53"}]}"#,
        )
        .unwrap();
        assert!(matches!(Runtime::from_config(&config), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_example_config_is_served() {
        assert!(Runtime::from_config(&Config::example()).is_ok());
    }

    #[tokio::test]
    async fn test_reverse_tcp_relay() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_addr = upstream.local_addr().unwrap();
        let echo = tokio::spawn(async move {
            let (mut socket, _) = upstream.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
            let mut rest = Vec::new();
            socket.read_to_end(&mut rest).await.unwrap();
            rest
        });

        let mode: ProxyMode = format!("reverse:tcp://{}", upstream_addr).parse().unwrap();
        let client = Connection::client(
            "10.0.0.1:50000".parse().unwrap(),
            "127.0.0.1:8080".parse().unwrap(),
            TransportProtocol::Tcp,
        );
        let handler = ConnectionHandler::new(
            client,
            mode,
            Arc::new(Options::default()),
            Arc::new(Services::default()),
        )
        .unwrap();

        let (proxy_side, mut peer) = tokio::io::duplex(1024);
        let (shutdown_tx, _) = broadcast::channel(1);
        let driver = tokio::spawn(drive_connection(
            handler,
            Box::new(proxy_side),
            Arc::new(TcpTransport::new()),
            shutdown_tx.subscribe(),
        ));

        peer.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        peer.shutdown().await.unwrap();
        let mut rest = Vec::new();
        peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        driver.await.unwrap().unwrap();
        assert!(echo.await.unwrap().is_empty());
    }
}
