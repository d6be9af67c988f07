use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt};

use crate::Result;
use crate::error::Error;

const DEFAULT_FILTER: &str = "errgate=info,warn";

/// Initialise tracing avec un filtre optionnel et un mode JSON conditionnel.
///
/// Ordre de résolution du filtre : argument explicite, `RUST_LOG`, puis
/// `errgate=info,warn`. Un candidat invalide est ignoré au profit du suivant.
///
/// # Errors
///
/// Retourne une erreur si aucun filtre n'est valide, si la couche JSON est
/// demandée sans la fonctionnalité `json-logs`, ou si l'installation du
/// subscriber global échoue.
pub fn init_tracing(explicit_filter: Option<&str>, use_json: bool) -> Result<()> {
    let filter = resolve_filter(explicit_filter, std::env::var("RUST_LOG").ok())?;

    #[cfg(feature = "json-logs")]
    if use_json {
        let subscriber = Registry::default().with(filter).with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .json()
                .with_current_span(false)
                .flatten_event(true),
        );
        return tracing::subscriber::set_global_default(subscriber)
            .map_err(|err| Error::Telemetry(err.to_string()));
    }

    #[cfg(not(feature = "json-logs"))]
    if use_json {
        return Err(Error::Telemetry(
            "binary was built without the `json-logs` feature".to_string(),
        ));
    }

    let subscriber = Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true));
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| Error::Telemetry(err.to_string()))
}

fn resolve_filter(explicit: Option<&str>, from_env: Option<String>) -> Result<EnvFilter> {
    explicit
        .map(str::to_string)
        .into_iter()
        .chain(from_env)
        .chain(std::iter::once(DEFAULT_FILTER.to_string()))
        .find_map(|candidate| EnvFilter::try_new(candidate).ok())
        .ok_or_else(|| Error::Telemetry("invalid log filter".to_string()))
}

#[cfg(test)]
mod tests {
    use super::resolve_filter;

    #[test]
    fn explicit_filter_wins_over_environment() {
        let filter = match resolve_filter(Some("errgate=trace"), Some("off".to_string())) {
            Ok(filter) => filter,
            Err(err) => panic!("filter should resolve: {err}"),
        };
        assert_eq!(filter.to_string(), "errgate=trace");
    }

    #[test]
    fn invalid_candidates_fall_through_to_default() {
        let filter = match resolve_filter(Some("errgate=loud"), None) {
            Ok(filter) => filter,
            Err(err) => panic!("filter should resolve: {err}"),
        };
        assert!(filter.to_string().contains("errgate=info"));
    }
}
