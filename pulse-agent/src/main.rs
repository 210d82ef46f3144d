use crate::agent::PulseAgent;
use crate::args::PulseAgentArgs;
use clap::Parser;
use log::info;
use std::io;
use std::time::Instant;
use tokio::select;

mod agent;
mod args;
mod error;

#[tokio::main]
async fn main() -> io::Result<()> {
    let args = PulseAgentArgs::parse();

    start(args)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

/// Start the Pulse agent with the given arguments.
/// This future keeps running until the agent is terminated.
/// Ends immediately if an error occurred while creating the agent.
async fn start(args: PulseAgentArgs) -> error::Result<()> {
    let _logger = args.logger()?;
    info!("Starting Pulse agent {} with {}", pulse_core::VERSION, args);

    let start = Instant::now();
    let properties = args.properties()?;
    let agent = PulseAgent::new(&properties.agent)?;
    let time_taken = start.elapsed();
    info!(
        "Created new Pulse agent instance in {}.{:03} seconds",
        time_taken.as_secs(),
        time_taken.subsec_millis()
    );

    let running = agent.run();
    tokio::pin!(running);
    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            agent.stop();
            running.await;
        },
        _ = &mut running => (),
    }

    Ok(())
}
