use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Fixed-width date format used in pair tokens and scene names
pub const TOKEN_DATE_FORMAT: &str = "%Y%m%d";

/// Satellite pass direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlightDirection {
    Ascending,
    Descending,
}

impl FlightDirection {
    /// Value expected by the archive search API
    pub fn as_query_value(&self) -> &'static str {
        match self {
            FlightDirection::Ascending => "ASCENDING",
            FlightDirection::Descending => "DESCENDING",
        }
    }
}

impl std::fmt::Display for FlightDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlightDirection::Ascending => write!(f, "ascending"),
            FlightDirection::Descending => write!(f, "descending"),
        }
    }
}

impl std::str::FromStr for FlightDirection {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ascending" | "asc" => Ok(FlightDirection::Ascending),
            "descending" | "desc" => Ok(FlightDirection::Descending),
            _ => Err(StackError::Config(format!("Invalid flight direction: {}", s))),
        }
    }
}

/// Two acquisition dates taken from one line of the pair feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatePair {
    pub date1: NaiveDate,
    pub date2: NaiveDate,
}

impl DatePair {
    /// Parse a `YYYYMMDD_YYYYMMDD` token
    pub fn parse(token: &str) -> StackResult<Self> {
        let token = token.trim();
        let mut parts = token.split('_');
        let (first, second) = match (parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(b), None) => (a, b),
            _ => return Err(StackError::InvalidPairToken(token.to_string())),
        };

        let parse = |s: &str| {
            if s.len() != 8 {
                return Err(StackError::InvalidPairToken(token.to_string()));
            }
            NaiveDate::parse_from_str(s, TOKEN_DATE_FORMAT)
                .map_err(|_| StackError::InvalidPairToken(token.to_string()))
        };

        Ok(DatePair {
            date1: parse(first)?,
            date2: parse(second)?,
        })
    }
}

/// Date to scene mapping produced by one resolution run; each entry is one
/// resolved catalog scene
pub type SceneMap = BTreeMap<NaiveDate, String>;

/// One row of the pair manifest
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairRecord {
    pub date1: NaiveDate,
    pub date2: NaiveDate,
    pub scene1: String,
    pub scene2: String,
}

impl PairRecord {
    /// Reference/secondary granule pair as submitted to the batch service
    pub fn granules(&self) -> (&str, &str) {
        (&self.scene1, &self.scene2)
    }
}

/// Remote job status as reported by the batch service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Succeeded => write!(f, "SUCCEEDED"),
            JobStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Product file attached to a finished job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFile {
    pub url: String,
    pub filename: String,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Handle on a job owned by the batch service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteJob {
    pub job_id: String,
    pub name: String,
    pub status: JobStatus,
    /// Reference and secondary granule
    pub granules: Vec<String>,
    #[serde(default)]
    pub files: Vec<JobFile>,
}

impl RemoteJob {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn result_file(&self) -> Option<&JobFile> {
        self.files.first()
    }

    /// Whether this job was submitted for the given reference/secondary pair
    pub fn matches_granules(&self, reference: &str, secondary: &str) -> bool {
        self.granules.len() == 2 && self.granules[0] == reference && self.granules[1] == secondary
    }
}

/// Corner coordinates of one raster in its projected CRS
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RasterExtent {
    pub upper_left_x: f64,
    pub upper_left_y: f64,
    pub lower_right_x: f64,
    pub lower_right_y: f64,
}

impl RasterExtent {
    /// Extent from a GDAL geotransform and raster size (north-up rasters)
    pub fn from_geo_transform(gt: &[f64; 6], width: usize, height: usize) -> Self {
        RasterExtent {
            upper_left_x: gt[0],
            upper_left_y: gt[3],
            lower_right_x: gt[0] + width as f64 * gt[1],
            lower_right_y: gt[3] + height as f64 * gt[5],
        }
    }
}

/// Common footprint of a product set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlapFootprint {
    pub upper_left_x: f64,
    pub upper_left_y: f64,
    pub lower_right_x: f64,
    pub lower_right_y: f64,
}

impl OverlapFootprint {
    /// Innermost rectangle shared by all extents.
    ///
    /// The result may be inverted when the inputs are disjoint; see [`is_valid`](Self::is_valid).
    pub fn intersection<'a, I>(extents: I) -> StackResult<Self>
    where
        I: IntoIterator<Item = &'a RasterExtent>,
    {
        let mut iter = extents.into_iter();
        let first = iter.next().ok_or_else(|| {
            StackError::EmptyInput("no rasters to compute a common overlap from".to_string())
        })?;

        let footprint = iter.fold(OverlapFootprint::from(*first), |acc, e| OverlapFootprint {
            upper_left_x: acc.upper_left_x.max(e.upper_left_x),
            upper_left_y: acc.upper_left_y.min(e.upper_left_y),
            lower_right_x: acc.lower_right_x.min(e.lower_right_x),
            lower_right_y: acc.lower_right_y.max(e.lower_right_y),
        });

        Ok(footprint)
    }

    pub fn is_valid(&self) -> bool {
        self.upper_left_x <= self.lower_right_x && self.upper_left_y >= self.lower_right_y
    }

    pub fn width(&self) -> f64 {
        self.lower_right_x - self.upper_left_x
    }

    pub fn height(&self) -> f64 {
        self.upper_left_y - self.lower_right_y
    }
}

impl From<RasterExtent> for OverlapFootprint {
    fn from(e: RasterExtent) -> Self {
        OverlapFootprint {
            upper_left_x: e.upper_left_x,
            upper_left_y: e.upper_left_y,
            lower_right_x: e.lower_right_x,
            lower_right_y: e.lower_right_y,
        }
    }
}

impl std::fmt::Display for OverlapFootprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:.3}, {:.3}, {:.3}, {:.3}]",
            self.upper_left_x, self.upper_left_y, self.lower_right_x, self.lower_right_y
        )
    }
}

/// Error types for stack preparation
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid pair token: '{0}'")]
    InvalidPairToken(String),

    #[error("Found {count} scenes for {date}, should find exactly 1")]
    Cardinality { date: NaiveDate, count: usize },

    #[error("No resolved scene for {0}")]
    MissingScene(NaiveDate),

    #[error("Remote service error: {0}")]
    Remote(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("No overlap: footprint {footprint} is degenerate for {path}")]
    NoOverlap { footprint: OverlapFootprint, path: PathBuf },

    #[error("Unsupported raster {path}: {reason}")]
    Raster { path: PathBuf, reason: String },

    #[error("Invalid archive {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    #[error("Wait for project '{0}' was cancelled")]
    Cancelled(String),

    #[error("Timed out after {seconds}s waiting for project '{project}'")]
    Timeout { project: String, seconds: u64 },
}

/// Result type for stack operations
pub type StackResult<T> = Result<T, StackError>;
