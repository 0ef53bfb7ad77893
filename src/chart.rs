//! PNG chart rendering for captured series.
//!
//! Each watched process gets three charts: CPU (user and system on separate
//! axes), IO (reads and writes on separate axes) and resident memory.

use std::fmt;
use std::path::{Path, PathBuf};

use plotters::prelude::*;

use crate::config::ChartConfig;
use crate::series::SampleSeries;

pub enum ChartError {
    Draw { path: PathBuf, message: String },
}

impl fmt::Display for ChartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartError::Draw { path, message } => {
                write!(f, "failed to render chart {}: {message}", path.display())
            }
        }
    }
}

impl fmt::Debug for ChartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl std::error::Error for ChartError {}

/// One line to plot plus its legend entry and axis caption.
pub struct DataSeries<'a> {
    pub label: &'a str,
    pub axis_label: &'a str,
    pub values: &'a [f64],
}

/// Render the three activity charts for one process into `dir`, returning
/// the paths written.
pub fn render_watch_charts(
    series: &SampleSeries,
    dir: &Path,
    config: &ChartConfig,
) -> Result<Vec<PathBuf>, ChartError> {
    let size = (config.width, config.height);
    let title = format!("LOAD for cmd: {}", series.cmdline);
    let base = chart_basename(&series.cmdline);
    let mut rendered = Vec::with_capacity(3);

    let cpu_path = dir.join(format!("cpu_{base}.png"));
    render_chart(
        &series.time,
        DataSeries {
            label: "CPU %usr",
            axis_label: "load (%)",
            values: &series.usr,
        },
        Some(DataSeries {
            label: "CPU %system",
            axis_label: "load (%)",
            values: &series.sys,
        }),
        &title,
        size,
        &cpu_path,
    )?;
    rendered.push(cpu_path);

    let io_path = dir.join(format!("io_{base}.png"));
    render_chart(
        &series.time,
        DataSeries {
            label: "IO stats reads",
            axis_label: "reads (kB)",
            values: &series.io_read,
        },
        Some(DataSeries {
            label: "IO stats writes",
            axis_label: "writes (kB)",
            values: &series.io_write,
        }),
        &title,
        size,
        &io_path,
    )?;
    rendered.push(io_path);

    let mem_path = dir.join(format!("mem_{base}.png"));
    render_chart(
        &series.time,
        DataSeries {
            label: "Physical memory use",
            axis_label: "amount (kB)",
            values: &series.rss,
        },
        None,
        &title,
        size,
        &mem_path,
    )?;
    rendered.push(mem_path);

    Ok(rendered)
}

/// Render one chart; a second series goes on its own right-hand axis so
/// differently-scaled measures stay readable.
pub fn render_chart(
    time: &[f64],
    primary: DataSeries<'_>,
    secondary: Option<DataSeries<'_>>,
    title: &str,
    size: (u32, u32),
    path: &Path,
) -> Result<(), ChartError> {
    match secondary {
        Some(secondary) => draw_dual(time, primary, secondary, title, size, path),
        None => draw_single(time, primary, title, size, path),
    }
}

fn draw_single(
    time: &[f64],
    series: DataSeries<'_>,
    title: &str,
    size: (u32, u32),
    path: &Path,
) -> Result<(), ChartError> {
    let err = draw_err(path);
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(&err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..x_axis_max(time), 0f64..axis_max(series.values))
        .map_err(&err)?;

    chart
        .configure_mesh()
        .x_desc("duration (s)")
        .y_desc(series.axis_label)
        .draw()
        .map_err(&err)?;

    chart
        .draw_series(LineSeries::new(points(time, series.values), &BLUE))
        .map_err(&err)?
        .label(series.label)
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(&err)?;

    root.present().map_err(&err)
}

fn draw_dual(
    time: &[f64],
    primary: DataSeries<'_>,
    secondary: DataSeries<'_>,
    title: &str,
    size: (u32, u32),
    path: &Path,
) -> Result<(), ChartError> {
    let err = draw_err(path);
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(&err)?;

    let x_max = x_axis_max(time);
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .right_y_label_area_size(60)
        .build_cartesian_2d(0f64..x_max, 0f64..axis_max(primary.values))
        .map_err(&err)?
        .set_secondary_coord(0f64..x_max, 0f64..axis_max(secondary.values));

    chart
        .configure_mesh()
        .x_desc("duration (s)")
        .y_desc(primary.axis_label)
        .draw()
        .map_err(&err)?;

    chart
        .configure_secondary_axes()
        .y_desc(secondary.axis_label)
        .draw()
        .map_err(&err)?;

    chart
        .draw_series(LineSeries::new(points(time, primary.values), &BLUE))
        .map_err(&err)?
        .label(primary.label)
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

    chart
        .draw_secondary_series(LineSeries::new(points(time, secondary.values), &RED))
        .map_err(&err)?
        .label(secondary.label)
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(&err)?;

    root.present().map_err(&err)
}

fn points<'a>(time: &'a [f64], values: &'a [f64]) -> impl Iterator<Item = (f64, f64)> + 'a {
    time.iter().zip(values).map(|(&x, &y)| (x, y))
}

fn draw_err<E: fmt::Display>(path: &Path) -> impl Fn(E) -> ChartError + '_ {
    move |e| ChartError::Draw {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// Y-axis upper bound: 20% headroom over the peak, with a floor of 1 so a
/// flat zero series still gets a visible axis.
fn axis_max(values: &[f64]) -> f64 {
    let max = values.iter().fold(0.0_f64, |acc, &v| acc.max(v));
    if max > 0.0 {
        max * 1.2
    } else {
        1.0
    }
}

fn x_axis_max(time: &[f64]) -> f64 {
    time.last().copied().unwrap_or(0.0).max(1.0)
}

/// Command line turned into a filesystem-safe chart file stem.
fn chart_basename(cmdline: &str) -> String {
    cmdline.replace(' ', "-").replace('/', "_")
}
