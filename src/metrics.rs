use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Opts, Registry, TextEncoder,
};

use crate::state::{ChannelKind, Classification, LampCommand};

/// Metrics registry for the agent, scraped by Prometheus.
#[derive(Clone)]
pub struct AppMetrics {
    registry: Arc<Registry>,
    loops: LoopMetrics,
    channels: ChannelMetrics,
    lamp: LampMetrics,
}

impl AppMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new_custom(Some("lampmon".into()), None)?);

        let loops = LoopMetrics::register(&registry)?;
        let channels = ChannelMetrics::register(&registry)?;
        let lamp = LampMetrics::register(&registry)?;

        Ok(Self {
            registry,
            loops,
            channels,
            lamp,
        })
    }

    pub fn encode(&self) -> Result<String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub fn observe_duration(&self, loop_name: &str, elapsed: Duration) {
        self.loops
            .duration
            .with_label_values(&[loop_name])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_success(&self, loop_name: &str, success: bool) {
        self.loops
            .up
            .with_label_values(&[loop_name])
            .set(i64::from(success));
    }

    pub fn inc_error(&self, loop_name: &str) {
        self.loops.errors.with_label_values(&[loop_name]).inc();
    }

    pub fn observe_interval(
        &self,
        channel: ChannelKind,
        average: f64,
        total_average: f64,
        classification: Classification,
    ) {
        let label = channel.attribute();
        self.channels
            .latest_average
            .with_label_values(&[label])
            .set(average);
        self.channels
            .total_average
            .with_label_values(&[label])
            .set(total_average);
        self.channels
            .classifications
            .with_label_values(&[label, classification.label()])
            .inc();
    }

    pub fn set_lamp_state(&self, state: LampCommand) {
        self.lamp
            .state
            .set(i64::from(matches!(state, LampCommand::On)));
    }

    pub fn inc_lamp_command(&self) {
        self.lamp.commands.inc();
    }

    pub fn inc_lamp_command_failure(&self) {
        self.lamp.command_failures.inc();
    }
}

#[derive(Clone)]
struct LoopMetrics {
    duration: HistogramVec,
    up: IntGaugeVec,
    errors: IntCounterVec,
}

impl LoopMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "loop_duration_seconds",
                "Wall time of one poller loop iteration.",
            ),
            &["loop"],
        )?;
        let up = IntGaugeVec::new(
            Opts::new("loop_up", "1 when the last iteration of the loop succeeded."),
            &["loop"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new("loop_errors_total", "Failed poller loop iterations."),
            &["loop"],
        )?;

        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(up.clone()))?;
        registry.register(Box::new(errors.clone()))?;

        Ok(Self {
            duration,
            up,
            errors,
        })
    }
}

#[derive(Clone)]
struct ChannelMetrics {
    latest_average: GaugeVec,
    total_average: GaugeVec,
    classifications: IntCounterVec,
}

impl ChannelMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let latest_average = GaugeVec::new(
            Opts::new(
                "channel_interval_average",
                "Average value of the latest recorded interval.",
            ),
            &["channel"],
        )?;
        let total_average = GaugeVec::new(
            Opts::new(
                "channel_total_average",
                "Running mean of all recorded interval averages.",
            ),
            &["channel"],
        )?;
        let classifications = IntCounterVec::new(
            Opts::new(
                "channel_classifications_total",
                "Interval classifications by outcome.",
            ),
            &["channel", "result"],
        )?;

        registry.register(Box::new(latest_average.clone()))?;
        registry.register(Box::new(total_average.clone()))?;
        registry.register(Box::new(classifications.clone()))?;

        Ok(Self {
            latest_average,
            total_average,
            classifications,
        })
    }
}

#[derive(Clone)]
struct LampMetrics {
    state: IntGauge,
    commands: IntCounter,
    command_failures: IntCounter,
}

impl LampMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let state = IntGauge::new("lamp_state", "Asserted lamp target (1 = on).")?;
        let commands = IntCounter::new(
            "lamp_commands_total",
            "Lamp commands accepted by the context broker.",
        )?;
        let command_failures = IntCounter::new(
            "lamp_command_failures_total",
            "Lamp commands the context broker failed to accept.",
        )?;

        registry.register(Box::new(state.clone()))?;
        registry.register(Box::new(commands.clone()))?;
        registry.register(Box::new(command_failures.clone()))?;

        Ok(Self {
            state,
            commands,
            command_failures,
        })
    }
}
