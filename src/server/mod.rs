//! Webhook transport: accepts `ImageReview` documents over HTTP(S) and
//! answers with the rendered decision.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use hyper::body::HttpBody;
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Body, Method, Request, Response, StatusCode};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::{Certificate, PrivateKey, ServerConfig};
use tracing::{debug, error, info, warn};

use crate::decision;
use crate::handler::{HandlerError, ReviewHandler};
use crate::scanner::Scanner;

/// Review documents are small; anything larger is rejected with 413.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub listen: String,
    pub tls: Option<TlsPaths>,
}

#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Binds `opts.listen` and serves until Ctrl-C.
pub async fn serve<S>(handler: Arc<ReviewHandler<S>>, opts: ServeOptions) -> Result<()>
where
    S: Scanner + Send + Sync + 'static,
{
    let addr: SocketAddr = opts
        .listen
        .parse()
        .with_context(|| format!("待ち受けアドレスが不正です: {}", opts.listen))?;

    let acceptor = match &opts.tls {
        Some(paths) => Some(TlsAcceptor::from(Arc::new(load_tls_config(
            &paths.cert,
            &paths.key,
        )?))),
        None => None,
    };

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("待ち受けを開始できませんでした: {addr}"))?;

    serve_listener(listener, handler, acceptor, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

/// Accept loop over an already bound listener; returns once `shutdown` resolves.
pub async fn serve_listener<S, F>(
    listener: TcpListener,
    handler: Arc<ReviewHandler<S>>,
    acceptor: Option<TlsAcceptor>,
    shutdown: F,
) -> Result<()>
where
    S: Scanner + Send + Sync + 'static,
    F: Future<Output = ()>,
{
    let addr = listener
        .local_addr()
        .context("待ち受けアドレスを取得できませんでした")?;
    info!(%addr, tls = acceptor.is_some(), "サーバーを起動しました");

    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(err) => {
                    warn!(error = %err, "接続の受け付けに失敗しました");
                    continue;
                }
            },
            _ = &mut shutdown => {
                info!("シャットダウンします");
                return Ok(());
            }
        };

        let handler = handler.clone();
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let handler = handler.clone();
                async move { Ok::<_, Infallible>(route(req, handler).await) }
            });

            let served = match acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls) => Http::new().serve_connection(tls, service).await,
                    Err(err) => {
                        warn!(%peer, error = %err, "TLS ハンドシェイクに失敗しました");
                        return;
                    }
                },
                None => Http::new().serve_connection(stream, service).await,
            };
            if let Err(err) = served {
                debug!(%peer, error = %err, "接続がエラーで終了しました");
            }
        });
    }
}

/// Handles one request. Every path is routed to the review handler.
pub async fn route<S>(req: Request<Body>, handler: Arc<ReviewHandler<S>>) -> Response<Body>
where
    S: Scanner + Send + Sync + 'static,
{
    debug!(method = %req.method(), uri = %req.uri(), "リクエストを受信しました");

    if req.method() != Method::POST {
        return text_response(StatusCode::METHOD_NOT_ALLOWED, "Invalid request method");
    }

    let body = match read_body(req.into_body(), MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(BodyError::TooLarge) => {
            warn!(limit = MAX_BODY_BYTES, "リクエスト本文が上限を超えています");
            return text_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
        }
        Err(BodyError::Read(err)) => {
            warn!(error = %err, "リクエスト本文を読み取れませんでした");
            return text_response(StatusCode::BAD_REQUEST, "Error reading request body");
        }
    };

    // Scanning blocks on external processes.
    let outcome = tokio::task::spawn_blocking(move || handler.handle(&body)).await;

    let decision = match outcome {
        Ok(Ok(decision)) => decision,
        Ok(Err(err @ HandlerError::Malformed(_))) => {
            warn!(error = %err, "不正なレビュー要求です");
            return text_response(StatusCode::BAD_REQUEST, &err.to_string());
        }
        Err(err) => {
            error!(error = %err, "レビュー処理が異常終了しました");
            return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    match decision::to_json(&decision) {
        Ok(json) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json))
            .unwrap_or_else(|_| Response::new(Body::empty())),
        Err(err) => {
            error!(error = %err, "判定をシリアライズできませんでした");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

#[derive(Debug)]
enum BodyError {
    TooLarge,
    Read(hyper::Error),
}

async fn read_body(mut body: Body, limit: usize) -> std::result::Result<Vec<u8>, BodyError> {
    if body.size_hint().lower() > limit as u64 {
        return Err(BodyError::TooLarge);
    }
    let mut buf = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(BodyError::Read)?;
        if buf.len() + chunk.len() > limit {
            return Err(BodyError::TooLarge);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

fn text_response(status: StatusCode, message: &str) -> Response<Body> {
    let mut resp = Response::new(Body::from(format!("{message}\n")));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    resp
}

pub fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<ServerConfig> {
    let cert_pem = std::fs::read(cert_path).with_context(|| {
        format!("証明書の読み取りに失敗しました: {}", cert_path.display())
    })?;
    let mut reader = cert_pem.as_slice();
    let certs: Vec<Certificate> = rustls_pemfile::certs(&mut reader)
        .with_context(|| format!("証明書(PEM)の解析に失敗しました: {}", cert_path.display()))?
        .into_iter()
        .map(Certificate)
        .collect();
    if certs.is_empty() {
        return Err(anyhow!(
            "証明書が見つかりませんでした: {}",
            cert_path.display()
        ));
    }

    let key_pem = std::fs::read(key_path).with_context(|| {
        format!("秘密鍵の読み取りに失敗しました: {}", key_path.display())
    })?;
    let key = read_private_key(&key_pem)
        .with_context(|| format!("秘密鍵(PEM)の解析に失敗しました: {}", key_path.display()))?;

    let mut config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("TLS 設定の構築に失敗しました")?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(config)
}

fn read_private_key(pem: &[u8]) -> Result<PrivateKey> {
    let mut reader = pem;
    loop {
        match rustls_pemfile::read_one(&mut reader)? {
            Some(rustls_pemfile::Item::PKCS8Key(key))
            | Some(rustls_pemfile::Item::RSAKey(key))
            | Some(rustls_pemfile::Item::ECKey(key)) => return Ok(PrivateKey(key)),
            Some(_) => continue,
            None => return Err(anyhow!("秘密鍵が見つかりませんでした")),
        }
    }
}
