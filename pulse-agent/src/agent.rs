use crate::error::Result;
use futures::future;
use log::{debug, info, warn};
use pulse_core::core::collector::{CollectionCycle, MetricSource, RuntimeSource, SystemSource};
use pulse_core::core::config::AgentProperties;
use pulse_core::core::dispatch::{
    BatchReceiver, DeliveryPool, DeliveryStats, DispatchQueue, HttpSender, Transport,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use url::Url;

/// The metrics agent, which wires the metric sources through the collection cycle and the
/// dispatch queue into the delivery pool of the remote collector.
#[derive(Debug)]
pub struct PulseAgent {
    address: Url,
    cycle: CollectionCycle,
    pool: DeliveryPool,
    receiver: Mutex<Option<BatchReceiver>>,
    cancellation_token: CancellationToken,
}

impl PulseAgent {
    /// Create a new agent which collects the runtime and system metrics of this host.
    pub fn new(properties: &AgentProperties) -> Result<Self> {
        let sources: Vec<Box<dyn MetricSource>> = vec![
            Box::new(RuntimeSource::new()),
            Box::new(SystemSource::new()),
        ];
        Self::with_sources(properties, sources)
    }

    /// Create a new agent which collects the given sources.
    pub fn with_sources(
        properties: &AgentProperties,
        sources: Vec<Box<dyn MetricSource>>,
    ) -> Result<Self> {
        let cancellation_token = CancellationToken::new();
        let sender = Arc::new(
            HttpSender::builder()
                .address(properties.address.as_str())
                .timeout(properties.request_timeout())
                .build()?,
        );
        let address = sender.address().clone();
        let (queue, receiver) = DispatchQueue::bounded(properties.queue_size);

        let pool = DeliveryPool::builder()
            .transport(Transport::new(sender, properties.batch))
            .backoff(properties.retry_backoff())
            .concurrency(properties.rate_limit)
            .cancellation_token(cancellation_token.child_token())
            .build();
        let cycle = sources
            .into_iter()
            .fold(CollectionCycle::builder(), |builder, source| {
                builder.source(source)
            })
            .poll_interval(properties.poll_interval())
            .report_interval(properties.report_interval())
            .queue(queue)
            .cancellation_token(cancellation_token.child_token())
            .build();

        debug!(
            "Created agent for {} with delivery concurrency {}",
            address,
            pool.concurrency()
        );
        Ok(Self {
            address,
            cycle,
            pool,
            receiver: Mutex::new(Some(receiver)),
            cancellation_token,
        })
    }

    /// Returns the address of the remote collector.
    pub fn address(&self) -> &Url {
        &self.address
    }

    /// Returns the delivery statistics of the agent.
    pub fn stats(&self) -> DeliveryStats {
        self.pool.stats()
    }

    /// Run the agent until it's stopped.
    /// The agent can only be run once, consecutive invocations return immediately.
    pub async fn run(&self) {
        let receiver = match self.receiver.lock().await.take() {
            Some(e) => e,
            None => {
                warn!("Pulse agent has already been started");
                return;
            }
        };

        info!("Pulse agent is reporting to {}", self.address);
        future::join(self.cycle.run(), self.pool.run(receiver)).await;

        let stats = self.pool.stats();
        info!(
            "Pulse agent has stopped, {} batches delivered and {} dropped ({} metrics)",
            stats.delivered, stats.dropped, stats.dropped_metrics
        );
    }

    /// Stop the agent.
    /// Pending pushes are abandoned, queued batches are discarded and in-flight deliveries are
    /// awaited before [PulseAgent::run] returns.
    pub fn stop(&self) {
        debug!("Stopping Pulse agent");
        self.cancellation_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use pulse_core::core::collector::MockMetricSource;
    use pulse_core::core::dispatch::DeliveryError;
    use pulse_core::init_logger;
    use pulse_core::testing::gauge;
    use std::time::Duration;
    use tokio::time;

    fn properties(address: String) -> AgentProperties {
        AgentProperties {
            address,
            poll_interval: 1,
            report_interval: 1,
            retry_backoff: vec![],
            request_timeout: 2,
            ..AgentProperties::default()
        }
    }

    fn alloc_source() -> Box<dyn MetricSource> {
        let mut source = MockMetricSource::new();
        source
            .expect_collect()
            .returning(|| Ok(vec![gauge("Alloc", 256.0)]));
        Box::new(source)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_delivers_batch() {
        init_logger!();
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/updates/")
                    .body_includes(r#""id":"PollCount""#)
                    .body_includes(r#""id":"Alloc""#);
                then.status(200);
            })
            .await;
        let agent = Arc::new(
            PulseAgent::with_sources(&properties(server.base_url()), vec![alloc_source()])
                .unwrap(),
        );

        let run_agent = agent.clone();
        let handle = tokio::spawn(async move { run_agent.run().await });
        time::sleep(Duration::from_millis(1500)).await;
        agent.stop();
        time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("expected the agent to have stopped")
            .unwrap();

        mock.assert_async().await;
        assert_eq!(1, agent.stats().delivered);
    }

    #[tokio::test]
    async fn test_run_twice() {
        init_logger!();
        let agent = PulseAgent::with_sources(
            &properties("http://localhost:8080".to_string()),
            vec![],
        )
        .unwrap();
        agent.stop();

        agent.run().await;
        let result = time::timeout(Duration::from_millis(200), agent.run()).await;

        assert!(result.is_ok(), "expected the second run to return immediately");
    }

    #[test]
    fn test_new_invalid_address() {
        let result = PulseAgent::new(&properties("http://".to_string()));

        assert!(
            matches!(
                result,
                Err(crate::error::AgentError::Sender(DeliveryError::InvalidAddress(_)))
            ),
            "expected an invalid address error"
        );
    }
}
