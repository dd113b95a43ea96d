//! # Portfolio Data Utilities
//!
//! $$
//! r_t=\frac{p_t}{p_{t-1}}-1,\qquad \hat\mu = P\,\bar r,\qquad \hat\Sigma = P\,\widehat{\mathrm{Cov}}(r)
//! $$
//!
//! Price tables, return preprocessing and annualized mean/covariance estimates.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use ndarray::s;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use ndarray_stats::CorrelationExt;
use tracing::debug;

use crate::error::PortfolioError;
use crate::error::Result;

/// Trading days used to annualize daily statistics.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Close prices, one row per observation and one column per asset.
///
/// Missing prices are stored as `NaN`.
#[derive(Clone, Debug)]
pub struct PriceTable {
  pub assets: Vec<String>,
  pub prices: Array2<f64>,
}

impl PriceTable {
  pub fn new(assets: Vec<String>, prices: Array2<f64>) -> Result<Self> {
    if assets.is_empty() {
      return Err(PortfolioError::EmptyUniverse);
    }
    if prices.ncols() != assets.len() {
      return Err(PortfolioError::DimensionMismatch {
        context: "price columns",
        expected: assets.len(),
        got: prices.ncols(),
      });
    }

    Ok(Self { assets, prices })
  }

  /// Read a CSV whose header is `label,ASSET_1,...,ASSET_N`.
  ///
  /// The first column (usually a date) is ignored. Empty or unparsable cells
  /// become missing values.
  pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
    let file = File::open(path.as_ref())?;
    Self::from_reader(file)
  }

  pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
    let mut rdr = csv::ReaderBuilder::new()
      .has_headers(true)
      .trim(csv::Trim::All)
      .from_reader(reader);

    let headers = rdr.headers()?.clone();
    if headers.len() < 2 {
      return Err(PortfolioError::InsufficientData(
        "price CSV needs a label column and at least one asset column".into(),
      ));
    }
    let assets: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut values = Vec::new();
    let mut n_rows = 0;
    for record in rdr.records() {
      let record = record?;
      values.extend(
        record
          .iter()
          .skip(1)
          .map(|cell| cell.parse::<f64>().unwrap_or(f64::NAN)),
      );
      n_rows += 1;
    }

    let prices = Array2::from_shape_vec((n_rows, assets.len()), values)
      .map_err(|e| PortfolioError::InsufficientData(e.to_string()))?;
    debug!(rows = n_rows, assets = assets.len(), "loaded price table");

    Self::new(assets, prices)
  }

  pub fn n_assets(&self) -> usize {
    self.assets.len()
  }

  /// Simple returns with incomplete rows removed.
  pub fn returns(&self) -> ReturnSeries {
    ReturnSeries {
      assets: self.assets.clone(),
      returns: simple_returns(&self.prices),
    }
  }
}

/// Periodic returns, one row per time step and one column per asset, with no
/// missing values.
#[derive(Clone, Debug)]
pub struct ReturnSeries {
  pub assets: Vec<String>,
  pub returns: Array2<f64>,
}

impl ReturnSeries {
  /// Annualize mean and covariance with `periods_per_year` periods.
  pub fn annualize(&self, periods_per_year: f64) -> Result<AssetStatistics> {
    let (mean_returns, cov_matrix) = annualized_statistics(&self.returns, periods_per_year)?;

    Ok(AssetStatistics {
      assets: self.assets.clone(),
      mean_returns,
      cov_matrix,
      periods_per_year,
    })
  }
}

/// Annualized statistics handed to the optimizer.
#[derive(Clone, Debug)]
pub struct AssetStatistics {
  pub assets: Vec<String>,
  pub mean_returns: Array1<f64>,
  pub cov_matrix: Array2<f64>,
  pub periods_per_year: f64,
}

impl AssetStatistics {
  pub fn n_assets(&self) -> usize {
    self.mean_returns.len()
  }
}

/// Remove every row that contains a non-finite value.
pub fn drop_missing_rows(data: &Array2<f64>) -> Array2<f64> {
  let keep: Vec<usize> = data
    .axis_iter(Axis(0))
    .enumerate()
    .filter(|(_, row)| row.iter().all(|v| v.is_finite()))
    .map(|(i, _)| i)
    .collect();

  if keep.is_empty() {
    return Array2::zeros((0, data.ncols()));
  }
  data.select(Axis(0), &keep)
}

/// Percentage change between consecutive complete price rows.
///
/// Rows producing a non-finite return (for example after a zero price) are
/// dropped as well.
pub fn simple_returns(prices: &Array2<f64>) -> Array2<f64> {
  let clean = drop_missing_rows(prices);
  if clean.nrows() < 2 {
    return Array2::zeros((0, clean.ncols()));
  }

  let returns = &clean.slice(s![1.., ..]) / &clean.slice(s![..-1, ..]) - 1.0;
  drop_missing_rows(&returns)
}

/// Annualized mean vector and sample covariance (ddof = 1).
pub fn annualized_statistics(
  returns: &Array2<f64>,
  periods_per_year: f64,
) -> Result<(Array1<f64>, Array2<f64>)> {
  if !periods_per_year.is_finite() || periods_per_year <= 0.0 {
    return Err(PortfolioError::InvalidConfig(format!(
      "periods_per_year must be positive, got {periods_per_year}"
    )));
  }
  if returns.ncols() == 0 {
    return Err(PortfolioError::EmptyUniverse);
  }
  if returns.nrows() < 2 {
    return Err(PortfolioError::InsufficientData(format!(
      "at least two return observations are required, got {}",
      returns.nrows()
    )));
  }
  if returns.iter().any(|v| !v.is_finite()) {
    return Err(PortfolioError::NonFiniteInput("returns"));
  }

  let mean = returns
    .mean_axis(Axis(0))
    .ok_or_else(|| PortfolioError::InsufficientData("empty return series".into()))?;
  // rows of the transposed view are the assets
  let cov = returns
    .t()
    .cov(1.0)
    .map_err(|e| PortfolioError::InsufficientData(e.to_string()))?;

  Ok((mean * periods_per_year, cov * periods_per_year))
}
