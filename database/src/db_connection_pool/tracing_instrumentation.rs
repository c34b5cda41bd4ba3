use diesel::connection::Instrumentation;
use diesel::connection::InstrumentationEvent;

/// Logs connection lifecycle and query events through `tracing`
#[derive(Debug, Default)]
pub(super) struct TracingInstrumentation;

impl Instrumentation for TracingInstrumentation {
    fn on_connection_event(&mut self, event: InstrumentationEvent<'_>) {
        match event {
            InstrumentationEvent::StartQuery { query, .. } => {
                tracing::trace!(query = %query, "query started");
            }
            InstrumentationEvent::FinishQuery { query, error, .. } => match error {
                Some(error) => {
                    tracing::debug!(query = %query, %error, "query failed");
                }
                None => {
                    tracing::trace!(query = %query, "query finished");
                }
            },
            InstrumentationEvent::StartEstablishConnection { url, .. } => {
                tracing::trace!(url, "establishing connection");
            }
            InstrumentationEvent::FinishEstablishConnection { url, error, .. } => match error {
                Some(error) => {
                    tracing::warn!(url, %error, "could not establish connection");
                }
                None => {
                    tracing::trace!(url, "connection established");
                }
            },
            _ => {}
        }
    }
}
