use std::sync::{Arc, Mutex};

use actix_web::rt::net::UdpSocket;
use anyhow::Result;
use log::{info, warn};
use tokio::signal;

mod api;
mod db;
mod decoder;
mod error;
mod req;
mod rollup;
mod schema;
mod utils;

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    // loads .env via dotenvy before the other env lookups
    let db = Arc::new(Mutex::new(db::Db::connect()?));
    let web_db = db.clone();

    let ingest_bind =
        std::env::var("INGEST_BIND").unwrap_or_else(|_| "0.0.0.0:8989".to_string());
    let http_bind = std::env::var("HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:8081".to_string());

    let sock = UdpSocket::bind(&ingest_bind).await?;
    info!("listening for node payloads on {ingest_bind}");

    let task = actix_web::rt::spawn(async move {
        let decoder = decoder::PayloadDecoder::new();
        let mut buf = [0; 1024];
        loop {
            tokio::select! {
                Ok((len, addr)) = sock.recv_from(&mut buf) => {
                    let raw = String::from_utf8_lossy(&buf[0..len]);
                    let measurement = match decoder.decode(&raw) {
                        Ok(m) => m,
                        Err(e) => {
                            warn!("rejected payload from {addr}: {e}");
                            continue;
                        }
                    };

                    match db.lock() {
                        Ok(mut db) => match db.insert_measurement(&measurement) {
                            Ok(stored) => info!(
                                "stored measurement {} from node {}",
                                stored.id, stored.node_id
                            ),
                            Err(e) => warn!("insert failed: {e}"),
                        },
                        Err(_) => warn!("store lock poisoned, dropping reading"),
                    }
                }
                Ok(()) = signal::ctrl_c() => { break; }
            }
        }
    });

    let _ = tokio::join!(api::new_http_server(web_db, http_bind), task);
    Ok(())
}
