use crate::{
    config::BoardConfig, layout::LayoutEngine, registry::Registry, render::Renderer,
};
use std::{
    io::{self, Write},
    sync::Arc,
};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::debug;

/// Drives pulse decay & redraws on a fixed interval, independent of feed cadence.
///
/// Each tick: decay -> snapshot -> layout -> render -> flush.
#[derive(Debug)]
pub struct RefreshClock<W> {
    registry: Arc<Registry>,
    engine: LayoutEngine,
    renderer: Renderer,
    config: BoardConfig,
    out: W,
    shutdown: watch::Receiver<bool>,
}

impl<W> RefreshClock<W>
where
    W: Write + Send + 'static,
{
    pub fn new(
        registry: Arc<Registry>,
        config: BoardConfig,
        renderer: Renderer,
        out: W,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry,
            engine: LayoutEngine::new(&config),
            renderer,
            config,
            out,
            shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<io::Result<W>> {
        tokio::spawn(self.run())
    }

    /// Redraw until shutdown, then once more if configured. Returns the writer.
    pub async fn run(mut self) -> io::Result<W> {
        let mut interval = tokio::time::interval(self.config.refresh_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                _ = interval.tick() => self.tick(Instant::now())?,
            }
        }

        if self.config.final_render {
            self.tick(Instant::now())?;
        }

        debug!(generation = self.engine.generation(), "refresh clock stopped");
        Ok(self.out)
    }

    /// Render one frame as of `now`.
    pub fn tick(&mut self, now: Instant) -> io::Result<()> {
        self.registry.decay(now, self.config.pulse.decay());
        let snapshot = self.registry.snapshot(now, self.config.stale_after);
        self.engine.update(&snapshot);
        self.renderer.render(&mut self.out, &self.engine, &snapshot)?;
        self.out.flush()
    }
}

/// Resolves once shutdown is requested or the sender has gone away.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|requested| *requested).await;
}
