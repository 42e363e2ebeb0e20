use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::http::connection::{Connection, ConnectionOptions};
use crate::pipeline::Dispatcher;

pub struct Listener {
    inner: TcpListener,
    dispatcher: Arc<Dispatcher>,
    options: ConnectionOptions,
}

impl Listener {
    pub async fn bind(
        addr: &str,
        dispatcher: Arc<Dispatcher>,
        options: ConnectionOptions,
    ) -> anyhow::Result<Self> {
        let inner = TcpListener::bind(addr).await?;
        info!("Listening on {}", inner.local_addr()?);
        Ok(Self { inner, dispatcher, options })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    /// Accepts connections forever, one task per connection.
    pub async fn serve(self) -> anyhow::Result<()> {
        loop {
            let (socket, peer) = self.inner.accept().await?;
            self.spawn(socket, peer);
        }
    }

    /// Like [`serve`](Self::serve) but returns once `shutdown` resolves.
    /// Connections already accepted keep running to completion.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.inner.accept() => {
                    let (socket, peer) = accepted?;
                    self.spawn(socket, peer);
                }
                _ = &mut shutdown => {
                    info!("Listener shutting down");
                    return Ok(());
                }
            }
        }
    }

    fn spawn(&self, socket: tokio::net::TcpStream, peer: SocketAddr) {
        debug!("Accepted connection from {}", peer);

        let dispatcher = Arc::clone(&self.dispatcher);
        let options = self.options.clone();
        tokio::spawn(async move {
            let mut conn = Connection::new(socket, dispatcher, options);
            if let Err(e) = conn.run().await {
                tracing::error!("Connection error from {}: {}", peer, e);
            }
        });
    }
}
