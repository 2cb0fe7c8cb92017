use std::panic;
use std::path::Path;

use anyhow::Result;
use ergsync::{ReconciledInterval, Sample};
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};

pub enum ChartKind {
    Png,
    Svg,
}

impl ChartKind {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("svg") => ChartKind::Svg,
            _ => ChartKind::Png,
        }
    }
}

/// Render the workout, turning backend panics (missing fonts and the like)
/// into an error string.
pub fn render_chart_guard(
    intervals: &[ReconciledInterval],
    samples: &[Sample],
    path: &Path,
    kind: ChartKind,
) -> Result<(), String> {
    let render = || -> Result<(), String> {
        render_chart(intervals, samples, path, kind).map_err(|e| format!("plotting error: {}", e))
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn render_chart(
    intervals: &[ReconciledInterval],
    samples: &[Sample],
    path: &Path,
    kind: ChartKind,
) -> Result<()> {
    if intervals.is_empty() && samples.is_empty() {
        return Ok(());
    }
    match kind {
        ChartKind::Png => {
            let root = BitMapBackend::new(path, (1280, 520)).into_drawing_area();
            draw_chart(root, intervals, samples)?;
        }
        ChartKind::Svg => {
            let root = SVGBackend::new(path, (1280, 520)).into_drawing_area();
            draw_chart(root, intervals, samples)?;
        }
    }
    Ok(())
}

fn draw_chart<DB>(
    root: DrawingArea<DB, plotters::coord::Shift>,
    intervals: &[ReconciledInterval],
    samples: &[Sample],
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;

    let x_max = intervals
        .iter()
        .map(|i| i.end_s)
        .chain(samples.iter().map(|s| s.t))
        .fold(0.0_f64, f64::max)
        / 60.0;
    let y_max = intervals
        .iter()
        .flat_map(|i| [i.start_value, i.end_value])
        .chain(samples.iter().map(|s| s.value))
        .fold(0.0_f64, f64::max);

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .set_label_area_size(LabelAreaPosition::Left, 50)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(0.0..x_max.max(1.0), 0.0..(y_max * 1.1).max(1.0))?;

    let axis_font = FontDesc::new(FontFamily::SansSerif, 16.0, FontStyle::Normal);
    chart
        .configure_mesh()
        .light_line_style(&TRANSPARENT)
        .x_desc("minutes")
        .y_desc("watts")
        .x_label_formatter(&|v| format!("{:.0}", v))
        .y_label_formatter(&|v| format!("{:.0}", v))
        .label_style(axis_font.color(&BLACK.mix(0.85)))
        .draw()?;

    // Zone-coloured trapezoid per interval, start to end power.
    chart.draw_series(intervals.iter().map(|interval| {
        let (r, g, b) = interval.zone.rgb();
        let x0 = interval.start_s / 60.0;
        let x1 = interval.end_s / 60.0;
        Polygon::new(
            vec![
                (x0, 0.0),
                (x0, interval.start_value),
                (x1, interval.end_value),
                (x1, 0.0),
            ],
            RGBColor(r, g, b).mix(0.45).filled(),
        )
    }))?;

    let profile_style = ShapeStyle {
        color: RGBColor(40, 40, 40).to_rgba(),
        filled: false,
        stroke_width: 2,
    };
    chart.draw_series(LineSeries::new(
        samples.iter().map(|s| (s.t / 60.0, s.value)),
        profile_style,
    ))?;

    root.present()?;
    Ok(())
}
