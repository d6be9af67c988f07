use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use humantime::parse_duration;

#[allow(clippy::struct_excessive_bools)]
#[derive(Parser, Debug)]
#[command(author, version, about = "Throttled error notifications for console endpoints", long_about = None)]
pub struct Cli {
    /// Chemin du fichier de configuration TOML.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Exécute une seule itération de sondage puis quitte.
    #[arg(long, action = ArgAction::SetTrue)]
    pub once: bool,

    /// Force l'intervalle de sondage (ex. "30s").
    #[arg(long, value_parser = parse_duration)]
    pub interval: Option<Duration>,

    /// Rejoue un fichier JSON lines d'échecs enregistrés au lieu de sonder.
    #[arg(long, value_name = "FILE")]
    pub replay: Option<PathBuf>,

    /// Autorise les URLs HTTP non chiffrées.
    #[arg(long, action = ArgAction::SetTrue)]
    pub insecure: bool,

    /// N'émet pas de notifications, logue uniquement ce qui serait envoyé.
    #[arg(long, action = ArgAction::SetTrue)]
    pub dry_run: bool,

    /// Masque toutes les erreurs au démarrage (bascule avec SIGUSR1).
    #[arg(long, action = ArgAction::SetTrue)]
    pub hide_all_errors: bool,

    /// Utilise un layer JSON pour les logs (`--features json-logs`).
    #[arg(long, action = ArgAction::SetTrue)]
    pub json_logs: bool,

    /// Filtre de logs explicite (ex. "errgate=debug").
    #[arg(long, value_name = "FILTER")]
    pub log_filter: Option<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
