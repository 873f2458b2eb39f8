//! In-process NNTP server for exercising the real client
//!
//! Speaks just enough of RFC 3977 for a speedtest over implicit TLS with a
//! self-signed certificate: greeting, AUTHINFO, MODE READER, GROUP,
//! OVER/XOVER, ARTICLE and QUIT. Article bodies are dot-stuffed on the way out.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};

use usenet_speedtest::Config;

/// One stored article
#[derive(Clone, Debug)]
pub struct FakeArticle {
    pub message_id: String,
    /// Content as the client should see it after unstuffing
    pub content: Vec<u8>,
    /// Listed in overview but answered with 430
    pub missing: bool,
}

/// What the fake server holds and which features it supports
#[derive(Clone, Debug)]
pub struct FakeServerSetup {
    pub group: String,
    pub articles: BTreeMap<u64, FakeArticle>,
    pub credentials: Option<(String, String)>,
    pub supports_over: bool,
}

impl FakeServerSetup {
    /// A group holding articles `low..=high`, each `lines` lines long
    pub fn with_articles(group: &str, low: u64, high: u64, lines: usize) -> Self {
        let articles = (low..=high)
            .map(|number| {
                let message_id = format!("<{number}@fake.test>");
                let content = make_article(&message_id, lines);
                (
                    number,
                    FakeArticle {
                        message_id,
                        content,
                        missing: false,
                    },
                )
            })
            .collect();
        Self {
            group: group.to_string(),
            articles,
            credentials: None,
            supports_over: true,
        }
    }

    /// Payload length of the articles numbered `start..=end` that can be fetched
    pub fn bytes_in(&self, start: u64, end: u64) -> u64 {
        self.articles
            .range(start..=end)
            .filter(|(_, a)| !a.missing)
            .map(|(_, a)| payload(&a.content).len() as u64)
            .sum()
    }
}

/// Article content as the client receives it: unstuffed, line terminators removed
pub fn payload(content: &[u8]) -> Vec<u8> {
    content
        .split_inclusive(|&b| b == b'\n')
        .flat_map(|line| {
            line.strip_suffix(b"\r\n")
                .or_else(|| line.strip_suffix(b"\n"))
                .unwrap_or(line)
        })
        .copied()
        .collect()
}

/// TLS acceptor holding a fresh self-signed certificate for `localhost`
fn self_signed_acceptor() -> TlsAcceptor {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_der = CertificateDer::from(cert.serialize_der().unwrap());
    let key_der = PrivatePkcs8KeyDer::from(cert.serialize_private_key_der());

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der], key_der.into())
        .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

/// Article text with headers and some lines that begin with a dot
pub fn make_article(message_id: &str, lines: usize) -> Vec<u8> {
    let mut content = format!(
        "Message-ID: {message_id}\r\nSubject: speedtest payload\r\nFrom: poster@fake.test\r\n\r\n"
    )
    .into_bytes();
    for i in 0..lines {
        if i % 7 == 3 {
            content.extend_from_slice(b".leading dot line\r\n");
        } else {
            content.extend_from_slice(format!("=ybody line {i:04} {}\r\n", "x".repeat(64)).as_bytes());
        }
    }
    content
}

/// Connection and command counters
#[derive(Debug, Default)]
pub struct FakeServerStats {
    pub connections: AtomicUsize,
    pub quits: AtomicUsize,
    pub commands: Mutex<Vec<String>>,
}

impl FakeServerStats {
    pub fn saw_command(&self, prefix: &str) -> bool {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.starts_with(prefix))
    }

    pub fn count_commands(&self, prefix: &str) -> usize {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

/// Running server; stops accepting when dropped
pub struct FakeServer {
    pub addr: SocketAddr,
    pub stats: Arc<FakeServerStats>,
    pub setup: Arc<FakeServerSetup>,
    task: JoinHandle<()>,
}

impl FakeServer {
    pub async fn start(setup: FakeServerSetup) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let acceptor = self_signed_acceptor();
        let stats = Arc::new(FakeServerStats::default());
        let setup = Arc::new(setup);

        let task = {
            let stats = Arc::clone(&stats);
            let setup = Arc::clone(&setup);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    stats.connections.fetch_add(1, Ordering::SeqCst);
                    let stats = Arc::clone(&stats);
                    let setup = Arc::clone(&setup);
                    let acceptor = acceptor.clone();
                    tokio::spawn(async move {
                        let result = match acceptor.accept(stream).await {
                            Ok(tls) => serve(tls, &setup, &stats).await,
                            Err(e) => Err(e),
                        };
                        if let Err(e) = result {
                            tracing::debug!(error = %e, "fake server connection ended");
                        }
                    });
                }
            })
        };

        Self {
            addr,
            stats,
            setup,
            task,
        }
    }

    /// Config pointed at this server with fast retries
    pub fn config(&self, connections: usize, articles: u64) -> Config {
        let mut config = Config::default();
        config.server.host = self.addr.ip().to_string();
        config.server.port = self.addr.port();
        config.server.allow_insecure_tls = true;
        config.benchmark.group = self.setup.group.clone();
        config.benchmark.connections = connections;
        config.benchmark.articles = articles;
        config.timeouts.connect = std::time::Duration::from_secs(5);
        config.timeouts.read = std::time::Duration::from_secs(5);
        config.retry.max_attempts = 0;
        config
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve<S>(stream: S, setup: &FakeServerSetup, stats: &FakeServerStats) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read, mut write) = tokio::io::split(stream);
    let mut lines = BufReader::new(read).lines();
    let mut authenticated = setup.credentials.is_none();
    let mut pending_user: Option<String> = None;

    write.write_all(b"200 fake.test ready\r\n").await?;
    write.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end().to_string();
        stats.commands.lock().unwrap().push(line.clone());
        let (verb, rest) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        let verb = verb.to_ascii_uppercase();

        let needs_auth = matches!(verb.as_str(), "GROUP" | "OVER" | "XOVER" | "ARTICLE");
        if needs_auth && !authenticated {
            write.write_all(b"480 authentication required\r\n").await?;
            write.flush().await?;
            continue;
        }

        match verb.as_str() {
            "AUTHINFO" => {
                let (kind, value) = rest.split_once(' ').unwrap_or((rest, ""));
                match kind.to_ascii_uppercase().as_str() {
                    "USER" => {
                        pending_user = Some(value.to_string());
                        write.write_all(b"381 password required\r\n").await?;
                    }
                    "PASS" => {
                        let ok = match (&setup.credentials, &pending_user) {
                            (Some((user, pass)), Some(given)) => user == given && pass == value,
                            (None, _) => true,
                            _ => false,
                        };
                        if ok {
                            authenticated = true;
                            write.write_all(b"281 authentication accepted\r\n").await?;
                        } else {
                            write.write_all(b"481 authentication rejected\r\n").await?;
                        }
                    }
                    _ => write.write_all(b"501 syntax error\r\n").await?,
                }
            }
            "MODE" => write.write_all(b"200 reader mode\r\n").await?,
            "GROUP" => {
                if rest == setup.group {
                    let low = setup.articles.keys().next().copied().unwrap_or(0);
                    let high = setup.articles.keys().last().copied().unwrap_or(0);
                    let reply = format!(
                        "211 {} {} {} {}\r\n",
                        setup.articles.len(),
                        low,
                        high,
                        setup.group
                    );
                    write.write_all(reply.as_bytes()).await?;
                } else {
                    write.write_all(b"411 no such group\r\n").await?;
                }
            }
            "OVER" if !setup.supports_over => {
                write.write_all(b"500 unknown command\r\n").await?;
            }
            "OVER" | "XOVER" => {
                let (start, end) = parse_range(rest);
                write.write_all(b"224 overview follows\r\n").await?;
                for (number, article) in setup.articles.range(start..=end) {
                    let entry = format!(
                        "{number}\tspeedtest payload\tposter@fake.test\t01 Jan 2024 00:00:00 GMT\t{}\t\t{}\t{}\r\n",
                        article.message_id,
                        article.content.len(),
                        article.content.split(|&b| b == b'\n').count()
                    );
                    write.write_all(entry.as_bytes()).await?;
                }
                write.write_all(b".\r\n").await?;
            }
            "ARTICLE" => {
                let found = setup
                    .articles
                    .values()
                    .find(|a| a.message_id == rest && !a.missing);
                match found {
                    Some(article) => {
                        write
                            .write_all(format!("220 0 {} article follows\r\n", article.message_id).as_bytes())
                            .await?;
                        write.write_all(&dot_stuff(&article.content)).await?;
                        write.write_all(b".\r\n").await?;
                    }
                    None => write.write_all(b"430 no such article\r\n").await?,
                }
            }
            "QUIT" => {
                stats.quits.fetch_add(1, Ordering::SeqCst);
                write.write_all(b"205 bye\r\n").await?;
                write.shutdown().await?;
                return Ok(());
            }
            _ => write.write_all(b"500 unknown command\r\n").await?,
        }
        write.flush().await?;
    }
    Ok(())
}

fn parse_range(arg: &str) -> (u64, u64) {
    match arg.split_once('-') {
        Some((start, end)) => (
            start.parse().unwrap_or(0),
            end.parse().unwrap_or(u64::MAX),
        ),
        None => {
            let n = arg.parse().unwrap_or(0);
            (n, n)
        }
    }
}

fn dot_stuff(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 16);
    for line in content.split_inclusive(|&b| b == b'\n') {
        if line.first() == Some(&b'.') {
            out.push(b'.');
        }
        out.extend_from_slice(line);
    }
    out
}
