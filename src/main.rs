use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use markowitz_rs::quant::portfolio::FrontierSampler;
use markowitz_rs::quant::portfolio::OptimizerConfig;
use markowitz_rs::quant::portfolio::PortfolioEngine;
use markowitz_rs::quant::portfolio::PortfolioObjective;
use markowitz_rs::quant::portfolio::PortfolioReport;
use markowitz_rs::quant::portfolio::PriceTable;
use markowitz_rs::quant::portfolio::TRADING_DAYS_PER_YEAR;
use markowitz_rs::visualization::plot_efficient_frontier;
use prettytable::row;
use prettytable::Cell;
use prettytable::Row;
use prettytable::Table;
use tracing::info;
use tracing::warn;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Maximum Sharpe ratio and minimum volatility portfolios from a CSV of
/// close prices.
#[derive(Parser, Debug)]
#[command(name = "markowitz-rs", version, about)]
struct Cli {
  /// CSV with a date column followed by one close-price column per asset.
  #[arg(long)]
  prices: PathBuf,

  /// Annualized risk-free rate.
  #[arg(long, default_value_t = 0.0)]
  risk_free_rate: f64,

  /// Maximum weight per asset.
  #[arg(long, default_value_t = 1.0)]
  weight_cap: f64,

  /// Allow weights down to -1.
  #[arg(long)]
  allow_short: bool,

  /// Observations per year used to annualize returns.
  #[arg(long, default_value_t = TRADING_DAYS_PER_YEAR)]
  periods_per_year: f64,

  /// Solver iteration limit.
  #[arg(long, default_value_t = 5000)]
  max_iters: u64,

  /// Random portfolios for the frontier chart.
  #[arg(long, default_value_t = 10_000)]
  samples: usize,

  /// Seed for the random portfolios.
  #[arg(long)]
  seed: Option<u64>,

  /// Write the efficient frontier chart to this HTML file.
  #[arg(long)]
  plot: Option<PathBuf>,

  /// Verbosity (-v info, -vv debug, -vvv trace).
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

impl Cli {
  fn init_logging(&self) -> Result<()> {
    let level = match self.verbose {
      0 => Level::WARN,
      1 => Level::INFO,
      2 => Level::DEBUG,
      _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
      .with_max_level(level)
      .with_target(false)
      .finish();
    tracing::subscriber::set_global_default(subscriber)
      .context("failed to set tracing subscriber")?;
    Ok(())
  }

  fn optimizer_config(&self) -> OptimizerConfig {
    OptimizerConfig::default()
      .with_risk_free_rate(self.risk_free_rate)
      .with_no_shorting(!self.allow_short)
      .with_weight_cap(self.weight_cap)
      .with_max_iters(self.max_iters)
  }
}

fn print_report(assets: &[String], report: &PortfolioReport) {
  println!("\n{}", report.objective);

  let mut table = Table::new();
  table.set_titles(row!["Asset", "Weight"]);
  for (asset, weight) in assets.iter().zip(report.result.weights.iter()) {
    table.add_row(Row::new(vec![
      Cell::new(asset),
      Cell::new(&format!("{weight:.4}")),
    ]));
  }
  if let Some(perf) = report.performance {
    table.add_row(row!["Expected return", format!("{:.4}", perf.expected_return)]);
    table.add_row(row!["Volatility", format!("{:.4}", perf.volatility)]);
    table.add_row(row!["Sharpe ratio", format!("{:.4}", perf.sharpe)]);
  }
  table.printstd();

  if !report.result.success {
    warn!(
      objective = %report.objective,
      message = %report.result.message,
      "optimization did not succeed, weights are the last iterate"
    );
    println!("warning: {}", report.result.message);
  }
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  cli.init_logging()?;

  let table = PriceTable::from_csv(&cli.prices)
    .with_context(|| format!("failed to read prices from {:?}", cli.prices))?;
  let stats = table
    .returns()
    .annualize(cli.periods_per_year)
    .context("failed to estimate annualized statistics")?;
  info!(assets = stats.n_assets(), "estimated annualized statistics");

  let engine = PortfolioEngine::new(cli.optimizer_config());
  let max_sharpe = engine.report(PortfolioObjective::MaxSharpe, &stats)?;
  let min_vol = engine.report(PortfolioObjective::MinVolatility, &stats)?;

  print_report(&stats.assets, &max_sharpe);
  print_report(&stats.assets, &min_vol);

  if let Some(path) = &cli.plot {
    let samples = engine.frontier(&stats, &FrontierSampler::new(cli.samples, cli.seed))?;
    plot_efficient_frontier(
      &samples,
      max_sharpe.performance,
      min_vol.performance,
      cli.risk_free_rate,
      path,
    )
    .with_context(|| format!("failed to write chart to {path:?}"))?;
    info!(path = ?path, samples = samples.len(), "wrote efficient frontier chart");
  }

  Ok(())
}
