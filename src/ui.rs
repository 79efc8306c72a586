//! Interface de terminal do pipesim — spinners e saída colorida.
//!
//! Usa as crates `indicatif` para um spinner por job e `console` para
//! estilização com cores. O [`PipelineProgress`] é um observador somente
//! leitura: ele apenas reflete os [`StatusEvent`]s publicados pelo simulador.

use std::collections::HashMap;
use std::time::Duration;

use console::Style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use pipesim::observer::{RunReport, StatusBoard, StatusCounts};
use pipesim::pipeline::{Job, JobStatus, Pipeline};
use pipesim::simulator::StatusEvent;

/// Indicador visual de progresso para uma execução do pipeline no terminal.
///
/// Cada job tem sua própria linha: cinza enquanto pendente, spinner durante
/// a execução, verde para sucesso e vermelho para falha.
pub struct PipelineProgress {
    // Uma barra por job, indexada pelo id.
    bars: HashMap<String, (ProgressBar, String)>,
    board: StatusBoard,
    green: Style,
    red: Style,
    dim: Style,
}

impl PipelineProgress {
    /// Cria uma linha pendente por job, agrupadas por estágio.
    pub fn start(pipeline: &Pipeline) -> Self {
        let multi = MultiProgress::new();
        let header = Style::new().bold();
        let dim = Style::new().dim();
        let mut bars = HashMap::new();

        for stage in &pipeline.stages {
            let title = multi.add(ProgressBar::new_spinner());
            title.finish_with_message(format!(
                "{} {}",
                header.apply_to(&stage.name),
                dim.apply_to(format!("({})", stage.mode))
            ));
            for job in &stage.jobs {
                let pb = multi.add(ProgressBar::new_spinner());
                pb.set_style(spinner_style());
                let line = job_line(job);
                pb.set_message(format!("{} {}", dim.apply_to(status_glyph(JobStatus::Pending)), line));
                bars.insert(job.id.clone(), (pb, line));
            }
        }

        Self {
            bars,
            board: StatusBoard::new(pipeline),
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            dim,
        }
    }

    /// Atualiza a linha do job referenciado pelo evento.
    pub fn update(&mut self, event: &StatusEvent) {
        self.board.apply(event);
        let Some((pb, line)) = self.bars.get(&event.job_id) else {
            return;
        };
        let glyph = status_glyph(event.status);
        match event.status {
            JobStatus::Pending => pb.set_message(format!("{} {line}", self.dim.apply_to(glyph))),
            JobStatus::Running => {
                pb.set_message(line.clone());
                pb.enable_steady_tick(Duration::from_millis(100));
            }
            JobStatus::Passed => {
                pb.finish_with_message(format!("{} {line}", self.green.apply_to(glyph)))
            }
            JobStatus::Failed => {
                pb.finish_with_message(format!("{} {line}", self.red.apply_to(glyph)))
            }
        }
    }

    /// Finaliza todas as linhas e exibe o resumo da execução.
    pub fn complete(&self) {
        for (pb, _) in self.bars.values() {
            if !pb.is_finished() {
                pb.finish();
            }
        }
        let counts = self.board.counts();
        let style = if counts.failed > 0 { &self.red } else { &self.green };
        println!();
        println!("{}", style.apply_to(summary_line(&counts)));
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("  {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn status_glyph(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "○",
        JobStatus::Running => "◐",
        JobStatus::Passed => "✓",
        JobStatus::Failed => "✗",
    }
}

/// Nome do job com rótulo, dispositivo e duração nominal,
/// ex.: `test device 3 (test) [Pixel 8 Pro] 2.8s`.
pub fn job_line(job: &Job) -> String {
    let mut line = job.name.clone();
    if let Some(label) = &job.label {
        line.push_str(&format!(" ({label})"));
    }
    if let Some(device) = &job.device {
        line.push_str(&format!(" [{device}]"));
    }
    let seconds = job.duration_ms as f64 / 1000.0;
    format!("{line} {seconds:.1}s")
}

pub fn summary_line(counts: &StatusCounts) -> String {
    let verdict = if counts.failed > 0 { "failed" } else { "passed" };
    format!(
        "Pipeline {verdict}: {} passed, {} failed, {} total",
        counts.passed,
        counts.failed,
        counts.total()
    )
}

/// Descrição textual do pipeline, um estágio por bloco.
pub fn render_pipeline(pipeline: &Pipeline) -> Vec<String> {
    let mut lines = vec![format!(
        "{} (job gap {}ms, stage gap {}ms)",
        pipeline.name, pipeline.pacing.job_gap_ms, pipeline.pacing.stage_gap_ms
    )];
    for (i, stage) in pipeline.stages.iter().enumerate() {
        lines.push(format!("{}. {} [{}]", i + 1, stage.name, stage.mode));
        for job in &stage.jobs {
            let fallible = if job.can_fail { " (may fail)" } else { "" };
            lines.push(format!("   - {}: {}{fallible}", job.id, job_line(job)));
        }
    }
    lines
}

/// Linha do tempo de uma execução, uma transição por linha.
pub fn render_timeline(events: &[StatusEvent]) -> Vec<String> {
    events
        .iter()
        .map(|e| {
            format!(
                "{:>7}ms  {} {:<8} {}",
                e.at_ms,
                status_glyph(e.status),
                e.status.to_string(),
                e.job_id
            )
        })
        .collect()
}

/// Imprime o relatório da execução formatado em JSON.
pub fn print_report(report: &RunReport) {
    println!("{}", serde_json::to_string_pretty(report).unwrap_or_default());
}
