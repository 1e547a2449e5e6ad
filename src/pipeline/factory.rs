//! Per-connection pipeline construction.

use std::io;
use std::sync::Arc;

use crate::pipeline::handler::{ConnectionContext, ProxyHandler};
use crate::pipeline::stream::{AsyncReadWrite, BoxedStream};
use crate::shaping::{ShapedStream, TrafficShaper};

/// Name of the first stage of every pipeline.
pub const TRAFFIC_SHAPING: &str = "traffic-shaping";

/// Builds a fresh pipeline for every accepted connection.
///
/// The shaper is always the first stage and the proxy chain only ever sees
/// the shaped stream; callers cannot reorder or drop the shaping stage.
#[derive(Clone)]
pub struct PipelineFactory {
    shaper: Arc<TrafficShaper>,
    chain: Arc<dyn ProxyHandler>,
}

impl PipelineFactory {
    pub fn new(shaper: Arc<TrafficShaper>, chain: Arc<dyn ProxyHandler>) -> Self {
        Self { shaper, chain }
    }

    pub fn shaper(&self) -> &Arc<TrafficShaper> {
        &self.shaper
    }

    pub fn build<S>(&self, stream: S, ctx: ConnectionContext) -> ConnectionPipeline
    where
        S: AsyncReadWrite + Unpin + Send + 'static,
    {
        let boxed: BoxedStream = Box::new(stream);
        ConnectionPipeline {
            ctx,
            stream: ShapedStream::new(boxed, Arc::clone(&self.shaper)),
            chain: Arc::clone(&self.chain),
        }
    }
}

impl std::fmt::Debug for PipelineFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineFactory")
            .field("chain", &self.chain.name())
            .finish()
    }
}

/// The ordered handler chain of one connection.
pub struct ConnectionPipeline {
    ctx: ConnectionContext,
    stream: ShapedStream<BoxedStream>,
    chain: Arc<dyn ProxyHandler>,
}

impl ConnectionPipeline {
    pub fn context(&self) -> &ConnectionContext {
        &self.ctx
    }

    /// Handler names in the order bytes pass through them.
    pub fn handler_names(&self) -> Vec<&str> {
        vec![TRAFFIC_SHAPING, self.chain.name()]
    }

    /// The shaper this pipeline reports to.
    pub fn shaper(&self) -> &Arc<TrafficShaper> {
        self.stream.shaper()
    }

    /// Hand the shaped connection to the proxy chain and drive it to completion.
    pub async fn run(self) -> io::Result<()> {
        let Self { ctx, stream, chain } = self;
        chain.handle(ctx, stream).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::ConnectionId;
    use crate::pipeline::handler::EchoHandler;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn context() -> ConnectionContext {
        ConnectionContext {
            id: ConnectionId::new(),
            peer: "10.0.0.1:4000".parse().unwrap(),
            listener: 3,
        }
    }

    #[tokio::test]
    async fn shaping_is_always_first() {
        let shaper = Arc::new(TrafficShaper::new(0, 0, Duration::from_secs(1)));
        let factory = PipelineFactory::new(Arc::clone(&shaper), Arc::new(EchoHandler));

        for _ in 0..3 {
            let (_client, server) = tokio::io::duplex(64);
            let pipeline = factory.build(server, context());
            assert_eq!(pipeline.handler_names(), vec![TRAFFIC_SHAPING, "echo"]);
            assert!(Arc::ptr_eq(pipeline.shaper(), &shaper));
        }
    }

    #[tokio::test]
    async fn context_reaches_the_chain_unmodified() {
        let shaper = Arc::new(TrafficShaper::new(0, 0, Duration::from_secs(1)));
        let factory = PipelineFactory::new(shaper, Arc::new(EchoHandler));
        let ctx = context();
        let pipeline = factory.build(tokio::io::duplex(64).1, ctx);
        assert_eq!(*pipeline.context(), ctx);
    }

    #[tokio::test]
    async fn every_byte_is_accounted() {
        let shaper = Arc::new(TrafficShaper::new(0, 0, Duration::from_secs(1)));
        let factory = PipelineFactory::new(Arc::clone(&shaper), Arc::new(EchoHandler));

        let (mut client, server) = tokio::io::duplex(1024);
        let task = tokio::spawn(factory.build(server, context()).run());

        client.write_all(&[9u8; 300]).await.unwrap();
        client.shutdown().await.unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        task.await.unwrap().unwrap();

        let snapshot = shaper.snapshot();
        assert_eq!(out.len(), 300);
        assert_eq!(snapshot.bytes_read, 300);
        assert_eq!(snapshot.bytes_written, 300);
    }
}
