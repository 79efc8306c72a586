//! Configuração do pipesim carregada a partir de `pipesim.toml`.
//!
//! A struct [`SimConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `PIPESIM_SEED` tem precedência sobre o arquivo.

use serde::Deserialize;
use std::path::Path;

use crate::error::{Result, SimError};
use crate::outcome::DEFAULT_FAILURE_PROBABILITY;

pub const CONFIG_FILE: &str = "pipesim.toml";
pub const SEED_ENV: &str = "PIPESIM_SEED";

/// Configuração de nível superior carregada de `pipesim.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct SimConfig {
    /// Semente do gerador aleatório. Sem semente, cada execução é diferente.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Probabilidade de falha de um job que pode falhar.
    #[serde(default = "default_failure_probability")]
    pub failure_probability: f64,

    /// Pipeline embutido usado quando nenhum arquivo é informado.
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Multiplicador de velocidade do relógio em tempo real.
    #[serde(default = "default_speed")]
    pub speed: f64,

    /// Atraso em milissegundos antes do início automático.
    #[serde(default = "default_autostart_delay_ms")]
    pub autostart_delay_ms: u64,
}

// Valor padrão para a probabilidade de falha: 0.15.
fn default_failure_probability() -> f64 {
    DEFAULT_FAILURE_PROBABILITY
}

// Valor padrão para o preset: "mobile".
fn default_preset() -> String {
    "mobile".to_string()
}

fn default_speed() -> f64 {
    1.0
}

// Valor padrão para o atraso de início: 500ms.
fn default_autostart_delay_ms() -> u64 {
    500
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: None,
            failure_probability: default_failure_probability(),
            preset: default_preset(),
            speed: default_speed(),
            autostart_delay_ms: default_autostart_delay_ms(),
        }
    }
}

impl SimConfig {
    /// Carrega a configuração de `pipesim.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<SimConfig>(&contents)?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo para a semente.
        if let Ok(seed) = std::env::var(SEED_ENV)
            && !seed.is_empty()
        {
            let seed = seed
                .parse()
                .map_err(|_| SimError::Config(format!("{SEED_ENV} must be an integer, got '{seed}'")))?;
            config.seed = Some(seed);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.failure_probability) {
            return Err(SimError::Config(format!(
                "failure_probability must be within [0, 1], got {}",
                self.failure_probability
            )));
        }
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(SimError::Config(format!(
                "speed must be positive, got {}",
                self.speed
            )));
        }
        Ok(())
    }
}
