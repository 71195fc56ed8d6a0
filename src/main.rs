mod config;

use api::{App, Bot, Discord, Runner};
use core::{convert::Infallible, pin::pin};
use http_body_util::Full;
use hyper::{server::conn::http1, service::service_fn, Response};
use hyper_util::rt::TokioIo;
use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tokio::{net::TcpListener, runtime::Runtime};

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = config::Config::from_env()?;
    let runtime = Runtime::new()?;
    runtime.block_on(run(config))
}

async fn run(config: config::Config) -> anyhow::Result<()> {
    let (client, connection) = config.postgres.connect(db::NoTls).await?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            log::error!("database connection closed: {err}");
        }
    });

    let repo = Arc::new(db::Database::from(client));
    let chat = Arc::new(Discord::new(config.token));
    let runner = Runner::new(repo, chat, config.settings);
    let app = Arc::new(App::new(Bot::new(runner, config.app), config.key));

    let addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, config.port).into();
    let listener = TcpListener::bind(addr).await?;
    log::info!("listening on {addr}");

    let mut stop = pin!(tokio::signal::ctrl_c());
    loop {
        let (stream, peer) = tokio::select! {
            biased;
            result = &mut stop => {
                result?;
                break;
            }
            conn = listener.accept() => match conn {
                Ok(conn) => conn,
                Err(err) => {
                    log::error!("failed to accept connection: {err}");
                    continue;
                }
            },
        };

        let app = Arc::clone(&app);
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let app = Arc::clone(&app);
                async move {
                    let res = app.try_respond(req).await.unwrap_or_else(|code| {
                        let mut res = Response::new(Full::default());
                        *res.status_mut() = code;
                        res
                    });
                    Ok::<_, Infallible>(res)
                }
            });
            if let Err(err) = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await {
                log::error!("connection with {peer} failed: {err}");
            }
        });
    }

    log::info!("shutting down");
    Ok(())
}
