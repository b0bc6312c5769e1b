use clap::ValueEnum;
use convergence_harness::{RunReport, ScenarioReport, ScenarioStatus};

#[derive(Clone, Copy, Debug)]
pub struct OutputWriter {
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    Markdown,
    #[default]
    PlainText,
}

impl OutputWriter {
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn write_str(self, line: &str) {
        match self.format {
            OutputFormat::Markdown => println!("{line}  "),
            OutputFormat::PlainText => println!("{line}"),
        }
    }

    pub fn write_header(self, header: &str, level: usize) {
        match self.format {
            OutputFormat::Markdown => println!("{} {}  ", "#".repeat(level), header),
            OutputFormat::PlainText => {
                println!(
                    "{}{}{}",
                    "-".repeat(level * 5),
                    header,
                    "-".repeat(level * 5),
                );
            }
        }
    }

    pub fn write_scenario(self, scenario: &ScenarioReport) {
        let elapsed = scenario.elapsed.as_millis();
        let line = match (&scenario.status, self.format) {
            (ScenarioStatus::Passed, OutputFormat::Markdown) => {
                format!(":white_check_mark: {} ({elapsed} ms)", scenario.name)
            }
            (ScenarioStatus::Passed, OutputFormat::PlainText) => {
                format!("PASS {} ({elapsed} ms)", scenario.name)
            }
            (ScenarioStatus::Quarantined, OutputFormat::Markdown) => {
                format!(":fast_forward: {} (quarantined)", scenario.name)
            }
            (ScenarioStatus::Quarantined, OutputFormat::PlainText) => {
                format!("SKIP {} (quarantined)", scenario.name)
            }
            (ScenarioStatus::Failed(error), OutputFormat::Markdown) => {
                format!(":x: {} ({elapsed} ms): `{error}`", scenario.name)
            }
            (ScenarioStatus::Failed(error), OutputFormat::PlainText) => {
                format!("FAIL {} ({elapsed} ms): {error}", scenario.name)
            }
        };

        self.write_str(&line);
    }

    pub fn write_report(self, report: &RunReport) {
        self.write_header("Scenarios", 2);
        for scenario in &report.scenarios {
            self.write_scenario(scenario);
        }
        self.write_str(&format!(
            "Seed {}: {} passed, {} failed, {} quarantined",
            report.seed,
            report.passed(),
            report.failed(),
            report.quarantined()
        ));
    }
}
