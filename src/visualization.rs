//! # Visualization
//!
//! $$
//! \{(\sigma_k, R_k, S_k)\}_{k=1}^m \cup \{\mathbf{w}_{S}^\*, \mathbf{w}_{\sigma}^\*\} \mapsto \text{efficient frontier chart}
//! $$
//!
use std::fs;
use std::path::Path;

use plotly::common::ColorBar;
use plotly::common::ColorScale;
use plotly::common::ColorScalePalette;
use plotly::common::DashType;
use plotly::common::Line;
use plotly::common::Marker;
use plotly::common::MarkerSymbol;
use plotly::common::Mode;
use plotly::common::Title;
use plotly::layout::Axis;
use plotly::Layout;
use plotly::Plot;
use plotly::Scatter;

use crate::error::Result;
use crate::quant::portfolio::capital_market_line;
use crate::quant::portfolio::FrontierSamples;
use crate::quant::portfolio::PortfolioPerformance;

/// Points on the capital market line.
const CML_POINTS: usize = 100;

/// Efficient-frontier chart builder.
pub struct FrontierPlot<'a> {
  samples: &'a FrontierSamples,
  max_sharpe: Option<PortfolioPerformance>,
  min_volatility: Option<PortfolioPerformance>,
  risk_free_rate: f64,
  title: String,
  width: usize,
  height: usize,
}

impl<'a> FrontierPlot<'a> {
  pub fn new(samples: &'a FrontierSamples, risk_free_rate: f64) -> Self {
    Self {
      samples,
      max_sharpe: None,
      min_volatility: None,
      risk_free_rate,
      title: "Efficient Frontier".to_string(),
      width: 1000,
      height: 650,
    }
  }

  pub fn title(mut self, title: &str) -> Self {
    self.title = title.into();
    self
  }

  pub fn size(mut self, width: usize, height: usize) -> Self {
    self.width = width;
    self.height = height;
    self
  }

  /// Mark the tangency portfolio and draw the capital market line through it.
  pub fn max_sharpe(mut self, perf: PortfolioPerformance) -> Self {
    self.max_sharpe = Some(perf);
    self
  }

  pub fn min_volatility(mut self, perf: PortfolioPerformance) -> Self {
    self.min_volatility = Some(perf);
    self
  }

  pub fn plot(&self) -> Plot {
    let mut plot = Plot::new();

    let hover = self
      .samples
      .sharpes
      .iter()
      .map(|s| format!("Sharpe: {s:.3}"))
      .collect::<Vec<String>>();
    let cloud = Scatter::new(
      self.samples.volatilities.clone(),
      self.samples.returns.clone(),
    )
    .mode(Mode::Markers)
    .name("Random portfolios")
    .marker(
      Marker::new()
        .size(5)
        .color_array(self.samples.sharpes.clone())
        .color_scale(ColorScale::Palette(ColorScalePalette::Viridis))
        .show_scale(true)
        .color_bar(ColorBar::new().title(Title::from("Sharpe Ratio"))),
    )
    .hover_text_array(hover);
    plot.add_trace(cloud);

    if let Some(perf) = self.max_sharpe {
      let tangency = Scatter::new(vec![perf.volatility], vec![perf.expected_return])
        .mode(Mode::Markers)
        .name(format!("Max Sharpe ({:.3})", perf.sharpe))
        .marker(
          Marker::new()
            .size(18)
            .color("red")
            .symbol(MarkerSymbol::Star),
        );
      plot.add_trace(tangency);

      let (xs, ys): (Vec<f64>, Vec<f64>) =
        capital_market_line(&perf, self.risk_free_rate, CML_POINTS)
          .into_iter()
          .unzip();
      let cml = Scatter::new(xs, ys)
        .mode(Mode::Lines)
        .name("Capital Market Line")
        .line(Line::new().color("red").dash(DashType::Dash));
      plot.add_trace(cml);
    }

    if let Some(perf) = self.min_volatility {
      let gmv = Scatter::new(vec![perf.volatility], vec![perf.expected_return])
        .mode(Mode::Markers)
        .name("Min Volatility")
        .marker(Marker::new().size(18).color("blue").symbol(MarkerSymbol::X));
      plot.add_trace(gmv);
    }

    plot.set_layout(
      Layout::new()
        .title(Title::from(self.title.as_str()))
        .width(self.width)
        .height(self.height)
        .x_axis(Axis::new().title("Volatility (Std. Deviation)"))
        .y_axis(Axis::new().title("Expected Return")),
    );

    plot
  }

  /// Write the chart as a standalone HTML file, creating parent directories.
  pub fn write_html<P: AsRef<Path>>(&self, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)?;
      }
    }
    self.plot().write_html(path);
    Ok(())
  }

  pub fn show(&self) {
    self.plot().show();
  }
}

/// Write the efficient frontier chart for `samples` and the two optimal
/// portfolios to `path`.
pub fn plot_efficient_frontier<P: AsRef<Path>>(
  samples: &FrontierSamples,
  max_sharpe: Option<PortfolioPerformance>,
  min_volatility: Option<PortfolioPerformance>,
  risk_free_rate: f64,
  path: P,
) -> Result<()> {
  let mut chart = FrontierPlot::new(samples, risk_free_rate);
  if let Some(perf) = max_sharpe {
    chart = chart.max_sharpe(perf);
  }
  if let Some(perf) = min_volatility {
    chart = chart.min_volatility(perf);
  }
  chart.write_html(path)
}
