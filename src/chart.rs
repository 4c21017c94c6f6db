use std::fmt::Write;

use crate::completion::CompletionReport;
use crate::effectiveness::EffectivenessReport;
use crate::performance::PerformanceReport;
use crate::trends::TrendSeries;

const WIDTH: f64 = 720.0;
const LABEL_WIDTH: f64 = 200.0;
const BAR_HEIGHT: f64 = 18.0;
const BAR_GAP: f64 = 6.0;
const TITLE_HEIGHT: f64 = 32.0;
const PANEL_GAP: f64 = 24.0;
const VALUE_WIDTH: f64 = 70.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub label: String,
    pub value: f64,
}

/// One horizontal bar chart. `max` fixes the axis when the values have a
/// natural ceiling, such as percentages.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    pub title: String,
    pub unit: &'static str,
    pub max: Option<f64>,
    pub bars: Vec<Bar>,
}

impl Panel {
    fn height(&self) -> f64 {
        let rows = self.bars.len().max(1) as f64;
        TITLE_HEIGHT + rows * (BAR_HEIGHT + BAR_GAP)
    }

    fn scale_max(&self) -> f64 {
        let observed = self.bars.iter().map(|b| b.value).fold(0.0, f64::max);
        match self.max {
            Some(max) => max.max(observed),
            None => observed,
        }
    }
}

pub fn grade_distribution_panel(report: &PerformanceReport) -> Panel {
    Panel {
        title: "Grade distribution".to_string(),
        unit: "",
        max: None,
        bars: report
            .distribution
            .iter()
            .map(|b| Bar {
                label: b.label.to_string(),
                value: b.count as f64,
            })
            .collect(),
    }
}

pub fn category_completion_panel(report: &CompletionReport) -> Panel {
    Panel {
        title: "Completion rate by category".to_string(),
        unit: "%",
        max: Some(100.0),
        bars: report
            .by_category
            .iter()
            .map(|g| Bar {
                label: g.key.clone(),
                value: g.completion_rate,
            })
            .collect(),
    }
}

pub fn difficulty_completion_panel(report: &CompletionReport) -> Panel {
    Panel {
        title: "Completion rate by difficulty".to_string(),
        unit: "%",
        max: Some(100.0),
        bars: report
            .by_difficulty
            .iter()
            .map(|g| Bar {
                label: g.key.clone(),
                value: g.completion_rate,
            })
            .collect(),
    }
}

pub fn top_mentors_panel(report: &EffectivenessReport, limit: usize) -> Panel {
    Panel {
        title: "Top mentors by effectiveness".to_string(),
        unit: "",
        max: Some(100.0),
        bars: report
            .top_effective
            .iter()
            .take(limit)
            .map(|m| Bar {
                label: m.mentor_name.clone(),
                value: m.effectiveness_score,
            })
            .collect(),
    }
}

pub fn monthly_panel(title: &str, series: &TrendSeries) -> Panel {
    Panel {
        title: title.to_string(),
        unit: "",
        max: None,
        bars: series
            .months
            .iter()
            .map(|m| Bar {
                label: m.period.to_string(),
                value: m.count as f64,
            })
            .collect(),
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn format_value(value: f64, unit: &str) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}{unit}")
    } else {
        format!("{value:.1}{unit}")
    }
}

/// Stacks the panels vertically into a single SVG document.
pub fn render_svg(panels: &[Panel]) -> String {
    let height: f64 = panels.iter().map(|p| p.height() + PANEL_GAP).sum::<f64>() + PANEL_GAP;
    let plot_width = WIDTH - LABEL_WIDTH - VALUE_WIDTH;

    let mut output = String::new();
    let _ = writeln!(
        output,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{height}" viewBox="0 0 {WIDTH} {height}" font-family="sans-serif" font-size="12">"#
    );
    let _ = writeln!(output, r#"<rect width="100%" height="100%" fill="white"/>"#);

    let mut top = PANEL_GAP;
    for panel in panels {
        let _ = writeln!(
            output,
            r#"<text x="10" y="{}" font-size="15" font-weight="bold">{}</text>"#,
            top + 18.0,
            escape(&panel.title)
        );

        let scale = panel.scale_max();
        let mut y = top + TITLE_HEIGHT;
        if panel.bars.is_empty() {
            let _ = writeln!(
                output,
                r##"<text x="{LABEL_WIDTH}" y="{}" fill="#777">No data</text>"##,
                y + BAR_HEIGHT - 4.0
            );
        }
        for bar in panel.bars.iter() {
            let width = if scale > 0.0 {
                (bar.value.max(0.0) / scale) * plot_width
            } else {
                0.0
            };
            let _ = writeln!(
                output,
                r#"<text x="{}" y="{}" text-anchor="end">{}</text>"#,
                LABEL_WIDTH - 8.0,
                y + BAR_HEIGHT - 4.0,
                escape(&bar.label)
            );
            let _ = writeln!(
                output,
                r##"<rect x="{LABEL_WIDTH}" y="{y}" width="{width:.1}" height="{BAR_HEIGHT}" fill="#4a7ab5"/>"##
            );
            let _ = writeln!(
                output,
                r#"<text x="{:.1}" y="{}">{}</text>"#,
                LABEL_WIDTH + width + 6.0,
                y + BAR_HEIGHT - 4.0,
                format_value(bar.value, panel.unit)
            );
            y += BAR_HEIGHT + BAR_GAP;
        }

        top += panel.height() + PANEL_GAP;
    }

    let _ = writeln!(output, "</svg>");
    output
}
