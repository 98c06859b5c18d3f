use opentelemetry_sdk::{logs::LoggerProvider, trace::TracerProvider as SdkTracerProvider};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Reported as `service.name` on exported spans and logs
    pub service_name: String,
    pub otel_endpoint: String,
    pub otel_enabled: bool,
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "beacon".to_string(),
            otel_endpoint: "http://localhost:4317".to_string(),
            otel_enabled: false,
            log_level: "info".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// OTLP collector to export to, `None` when export is off
    pub fn export_endpoint(&self) -> Option<&str> {
        let endpoint = self.otel_endpoint.trim();
        (self.otel_enabled && !endpoint.is_empty()).then_some(endpoint)
    }

    /// `RUST_LOG` wins over the configured level
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level))
    }
}

/// Export pipelines that must be flushed on shutdown
pub struct TelemetryProviders {
    pub tracer_provider: SdkTracerProvider,
    pub logger_provider: LoggerProvider,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_endpoint_only_when_enabled() {
        let mut config = TelemetryConfig::default();
        assert_eq!(config.export_endpoint(), None);

        config.otel_enabled = true;
        assert_eq!(config.export_endpoint(), Some("http://localhost:4317"));

        config.otel_endpoint = "  ".to_string();
        assert_eq!(config.export_endpoint(), None);
    }
}
