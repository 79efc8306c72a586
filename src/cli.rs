//! Interface de linha de comando do pipesim baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, simulate, stats, show)
//! e flags globais (--preset, --file, --seed, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use pipesim::pipeline::Preset;

/// pipesim — simulador de pipeline de CI/CD com relógio virtual.
#[derive(Debug, Parser)]
#[command(name = "pipesim", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Pipeline embutido a simular (sobrescreve o `preset` do pipesim.toml).
    #[arg(long, global = true)]
    pub preset: Option<PresetArg>,

    /// Caminho para um arquivo JSON ou TOML com a definição do pipeline.
    #[arg(long, global = true, conflicts_with = "preset")]
    pub file: Option<PathBuf>,

    /// Semente do gerador aleatório, para execuções reproduzíveis.
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Preset aceito pela CLI, mapeado para [`Preset`] internamente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PresetArg {
    /// build sequencial, testes em dispositivos em paralelo, relatório.
    Mobile,
    /// build, test e deploy em paralelo; todos os jobs podem falhar.
    Gitlab,
}

impl From<PresetArg> for Preset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Mobile => Preset::Mobile,
            PresetArg::Gitlab => Preset::Gitlab,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa o pipeline em tempo real com spinners por job.
    Run {
        /// Multiplicador de velocidade (2.0 = duas vezes mais rápido).
        #[arg(long)]
        speed: Option<f64>,

        /// Atraso em milissegundos antes do início automático.
        #[arg(long)]
        delay: Option<u64>,
    },

    /// Avança o relógio virtual até o fim e mostra a linha do tempo.
    Simulate {
        /// Imprime o relatório da execução em JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Executa o pipeline muitas vezes e mostra a taxa de falha por job.
    Stats {
        /// Número de execuções.
        #[arg(long, default_value_t = 10_000)]
        runs: u32,
    },

    /// Mostra a definição do pipeline.
    Show,
}
