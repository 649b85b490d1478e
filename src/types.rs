use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A fully closed OHLCV bar as supplied by the time-series store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Bar {
    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn body_low(&self) -> f64 {
        self.open.min(self.close)
    }

    pub fn body_high(&self) -> f64 {
        self.open.max(self.close)
    }

    /// Body as a fraction of the full range (0 for a zero-range bar)
    pub fn body_ratio(&self) -> f64 {
        let range = self.range();
        if range > 0.0 {
            self.body() / range
        } else {
            0.0
        }
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.body_high()
    }

    pub fn lower_wick(&self) -> f64 {
        self.body_low() - self.low
    }

    pub fn mid(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    pub fn true_range(&self, prev_close: f64) -> f64 {
        (self.high - self.low)
            .max((self.high - prev_close).abs())
            .max((self.low - prev_close).abs())
    }
}

/// Timeframe label such as "5m", "1h" or "1d"
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeframe(String);

impl Timeframe {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in minutes, if the label follows the `<n><unit>` convention
    pub fn minutes(&self) -> Option<u64> {
        let label = self.0.trim();
        let split = label.find(|c: char| !c.is_ascii_digit())?;
        let (count, unit) = label.split_at(split);
        let count: u64 = count.parse().ok()?;
        let unit_minutes = match unit {
            "m" | "min" => 1,
            "h" | "H" => 60,
            "d" | "D" => 24 * 60,
            "w" | "W" => 7 * 24 * 60,
            _ => return None,
        };
        Some(count * unit_minutes)
    }

    pub fn is_daily(&self) -> bool {
        self.minutes() == Some(24 * 60)
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Timeframe {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

/// Direction of a leg, event, pool or zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Bullish => Direction::Bearish,
            Direction::Bearish => Direction::Bullish,
        }
    }

    /// +1 for bullish, -1 for bearish
    pub fn sign(self) -> f64 {
        match self {
            Direction::Bullish => 1.0,
            Direction::Bearish => -1.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Bullish => write!(f, "BULLISH"),
            Direction::Bearish => write!(f, "BEARISH"),
        }
    }
}

/// Trend inferred from swing labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trend {
    Up,
    Down,
    Range,
    Unknown,
}

impl Trend {
    pub fn direction(self) -> Option<Direction> {
        match self {
            Trend::Up => Some(Direction::Bullish),
            Trend::Down => Some(Direction::Bearish),
            Trend::Range | Trend::Unknown => None,
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Up => write!(f, "UP"),
            Trend::Down => write!(f, "DOWN"),
            Trend::Range => write!(f, "RANGE"),
            Trend::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Directional bias. Only a change-of-character event moves it away from trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl Bias {
    pub fn from_trend(trend: Trend) -> Self {
        trend.direction().map(Bias::from).unwrap_or(Bias::Neutral)
    }

    pub fn direction(self) -> Option<Direction> {
        match self {
            Bias::Bullish => Some(Direction::Bullish),
            Bias::Bearish => Some(Direction::Bearish),
            Bias::Neutral => None,
        }
    }
}

impl From<Direction> for Bias {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Bullish => Bias::Bullish,
            Direction::Bearish => Bias::Bearish,
        }
    }
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bias::Bullish => write!(f, "BULLISH"),
            Bias::Bearish => write!(f, "BEARISH"),
            Bias::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Whether a pool or zone aligns with the current bias
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Primary,
    Countertrend,
    Neutral,
}

impl Role {
    /// Primary when `direction` matches `bias`, countertrend when it opposes it,
    /// neutral while there is no bias.
    pub fn relative(direction: Direction, bias: Bias) -> Self {
        match bias.direction() {
            Some(b) if b == direction => Role::Primary,
            Some(_) => Role::Countertrend,
            None => Role::Neutral,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Primary => write!(f, "PRIMARY"),
            Role::Countertrend => write!(f, "COUNTERTREND"),
            Role::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Higher-timeframe daily range hint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyRange {
    pub high: f64,
    pub low: f64,
}

impl DailyRange {
    pub fn contains(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }
}

/// Named session window (e.g. "london", "new_york")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SessionWindow {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// Optional higher-timeframe hints supplied alongside the bar series.
/// Read-only: the core never mutates it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    #[serde(default)]
    pub daily_range: Option<DailyRange>,
    #[serde(default)]
    pub sessions: Vec<SessionWindow>,
    #[serde(default)]
    pub htf_bias: Option<Bias>,
    #[serde(default)]
    pub htf_atr: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_minutes() {
        assert_eq!(Timeframe::from("5m").minutes(), Some(5));
        assert_eq!(Timeframe::from("4h").minutes(), Some(240));
        assert_eq!(Timeframe::from("1d").minutes(), Some(1440));
        assert_eq!(Timeframe::from("weekly").minutes(), None);
        assert!(Timeframe::from("1D").is_daily());
    }

    #[test]
    fn test_role_relative() {
        assert_eq!(Role::relative(Direction::Bullish, Bias::Bullish), Role::Primary);
        assert_eq!(Role::relative(Direction::Bearish, Bias::Bullish), Role::Countertrend);
        assert_eq!(Role::relative(Direction::Bearish, Bias::Neutral), Role::Neutral);
    }

    #[test]
    fn test_bar_anatomy() {
        let bar = Bar {
            timestamp: Utc::now(),
            open: 10.0,
            high: 14.0,
            low: 9.0,
            close: 12.0,
            volume: 1.0,
        };
        assert!(bar.is_bullish());
        assert_eq!(bar.body(), 2.0);
        assert_eq!(bar.upper_wick(), 2.0);
        assert_eq!(bar.lower_wick(), 1.0);
        assert!((bar.body_ratio() - 0.4).abs() < 1e-12);
    }
}
