//! Current-conditions weather lookup
//!
//! `QWeatherProvider` resolves a place name to a QWeather location id (geo API
//! first, built-in table second) and then fetches current conditions.

use async_trait::async_trait;
use lemo_common::{LemoError, Result, WeatherConfig};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Current weather at a place; units are already attached to the values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub city: String,
    pub temperature: String,
    pub feels_like: String,
    pub condition: String,
    pub wind_dir: String,
    pub wind_scale: String,
    pub humidity: String,
    pub pressure: String,
    pub visibility: String,
    pub update_time: String,
}

/// Source of current weather conditions
///
/// Failures are `LemoError::Weather` carrying a user-presentable reason.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn lookup_current(&self, place: &str) -> Result<CurrentWeather>;
}

/// Location ids for common cities and Beijing districts
const CITY_IDS: &[(&str, &str)] = &[
    ("北京", "101010100"),
    ("上海", "101020100"),
    ("天津", "101030100"),
    ("重庆", "101040100"),
    ("通州", "101010600"),
    ("海淀", "101010200"),
    ("朝阳", "101010300"),
    ("东城", "101010400"),
    ("西城", "101010500"),
    ("丰台", "101010700"),
    ("石景山", "101010800"),
    ("昌平", "101011100"),
    ("大兴", "101011200"),
    ("广州", "101280101"),
    ("深圳", "101280601"),
    ("杭州", "101210101"),
    ("南京", "101190101"),
    ("成都", "101270101"),
    ("武汉", "101200101"),
    ("西安", "101110101"),
    ("郑州", "101180101"),
    ("长沙", "101250101"),
    ("济南", "101120101"),
    ("沈阳", "101070101"),
    ("哈尔滨", "101050101"),
    ("昆明", "101290101"),
    ("南宁", "101300101"),
    ("福州", "101230101"),
    ("南昌", "101240101"),
    ("石家庄", "101090101"),
    ("太原", "101100101"),
    ("呼和浩特", "101080101"),
    ("长春", "101060101"),
    ("兰州", "101160101"),
    ("西宁", "101150101"),
    ("银川", "101170101"),
    ("乌鲁木齐", "101130101"),
    ("拉萨", "101140101"),
    ("贵阳", "101260101"),
    ("海口", "101310101"),
    ("合肥", "101220101"),
];

/// Look a place up in the built-in table, tolerating 市/区/县 suffixes
pub fn builtin_location_id(place: &str) -> Option<&'static str> {
    let name = place
        .trim()
        .trim_end_matches("的天气")
        .trim_end_matches("天气")
        .trim_end_matches(['市', '区', '县']);
    if name.is_empty() {
        return None;
    }

    if let Some((_, id)) = CITY_IDS.iter().find(|(city, _)| *city == name) {
        return Some(id);
    }

    CITY_IDS
        .iter()
        .find(|(city, _)| city.contains(name) || name.contains(city))
        .map(|(city, id)| {
            debug!("Fuzzy matched {:?} to {}", place, city);
            *id
        })
}

#[derive(Deserialize)]
struct GeoResponse {
    code: String,
    #[serde(default)]
    location: Vec<GeoLocation>,
}

#[derive(Deserialize)]
struct GeoLocation {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct NowResponse {
    code: String,
    #[serde(rename = "updateTime", default)]
    update_time: String,
    now: Option<NowConditions>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NowConditions {
    temp: Option<String>,
    feels_like: Option<String>,
    text: Option<String>,
    wind_dir: Option<String>,
    wind_scale: Option<String>,
    humidity: Option<String>,
    pressure: Option<String>,
    vis: Option<String>,
}

fn parse_now(body: &str, city: &str) -> Result<CurrentWeather> {
    let response: NowResponse = serde_json::from_str(body)?;
    let now = match (response.code.as_str(), response.now) {
        ("200", Some(now)) => now,
        (code, _) => {
            return Err(LemoError::Weather(format!("获取天气失败: code={}", code)));
        }
    };

    let or_na = |v: Option<String>| v.unwrap_or_else(|| "N/A".to_string());
    let or_unknown = |v: Option<String>| v.unwrap_or_else(|| "未知".to_string());

    Ok(CurrentWeather {
        city: city.to_string(),
        temperature: format!("{}°C", or_na(now.temp)),
        feels_like: format!("{}°C", or_na(now.feels_like)),
        condition: or_unknown(now.text),
        wind_dir: or_unknown(now.wind_dir),
        wind_scale: or_unknown(now.wind_scale),
        humidity: format!("{}%", or_na(now.humidity)),
        pressure: format!("{} hPa", or_na(now.pressure)),
        visibility: format!("{} km", or_na(now.vis)),
        update_time: response.update_time,
    })
}

/// QWeather (和风天气) API client
pub struct QWeatherProvider {
    client: Client,
    api_key: Option<String>,
    api_host: String,
}

impl QWeatherProvider {
    pub fn new(config: &WeatherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| LemoError::Weather(format!("Failed to build HTTP client: {}", e)))?;

        if config.api_key.is_none() {
            warn!("QWeather API key not configured; weather lookups will fail");
        }

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_host: config.api_host.clone(),
        })
    }

    async fn geo_lookup(&self, api_key: &str, place: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(format!("https://{}/geo/v2/city/lookup", self.api_host))
            .header("X-QW-Api-Key", api_key)
            .query(&[("location", place), ("lang", "zh")])
            .send()
            .await
            .map_err(|e| LemoError::Weather(format!("城市查询异常: {}", e)))?;

        if !response.status().is_success() {
            return Err(LemoError::Weather(format!(
                "城市查询失败: HTTP {}",
                response.status().as_u16()
            )));
        }

        let geo: GeoResponse = response
            .json()
            .await
            .map_err(|e| LemoError::Weather(format!("城市查询响应无效: {}", e)))?;
        if geo.code != "200" {
            debug!("Geo lookup for {:?} returned code {}", place, geo.code);
            return Ok(None);
        }

        Ok(geo.location.into_iter().next().map(|location| {
            info!("Geo lookup resolved {:?} to {} ({})", place, location.name, location.id);
            location.id
        }))
    }

    /// Resolve a place to a location id, falling back to the built-in table
    async fn location_id(&self, api_key: &str, place: &str) -> Option<String> {
        match self.geo_lookup(api_key, place).await {
            Ok(Some(id)) => return Some(id),
            Ok(None) => {}
            Err(e) => warn!("{}", e),
        }
        builtin_location_id(place).map(str::to_string)
    }
}

#[async_trait]
impl WeatherProvider for QWeatherProvider {
    async fn lookup_current(&self, place: &str) -> Result<CurrentWeather> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            LemoError::Weather("天气 API Key 未配置，请联系管理员配置 QWEATHER_API_KEY".to_string())
        })?;

        let location_id = self.location_id(api_key, place).await.ok_or_else(|| {
            LemoError::Weather(format!("未找到城市：{}，请检查城市名称是否正确", place))
        })?;

        let response = self
            .client
            .get(format!("https://{}/v7/weather/now", self.api_host))
            .header("X-QW-Api-Key", api_key)
            .query(&[("location", location_id.as_str()), ("lang", "zh")])
            .send()
            .await
            .map_err(|e| LemoError::Weather(format!("获取天气异常: {}", e)))?;

        if !response.status().is_success() {
            return Err(LemoError::Weather(format!(
                "天气 API 请求失败: HTTP {}",
                response.status().as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LemoError::Weather(format!("获取天气异常: {}", e)))?;
        let weather = parse_now(&body, place)?;
        info!("Weather for {}: {} {}", place, weather.temperature, weather.condition);
        Ok(weather)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_location_id() {
        assert_eq!(builtin_location_id("北京"), Some("101010100"));
        assert_eq!(builtin_location_id("北京市"), Some("101010100"));
        assert_eq!(builtin_location_id("通州区"), Some("101010600"));
        assert_eq!(builtin_location_id("上海天气"), Some("101020100"));
        assert_eq!(builtin_location_id("哈尔滨市"), Some("101050101"));
        assert_eq!(builtin_location_id("火星"), None);
        assert_eq!(builtin_location_id("市"), None);
    }

    #[test]
    fn test_parse_now() {
        let body = r#"{
            "code": "200",
            "updateTime": "2024-03-15T10:02+08:00",
            "now": {
                "temp": "12", "feelsLike": "10", "text": "多云",
                "windDir": "东北风", "windScale": "3", "humidity": "40",
                "pressure": "1012", "vis": "25"
            }
        }"#;

        let weather = parse_now(body, "北京").unwrap();
        assert_eq!(weather.temperature, "12°C");
        assert_eq!(weather.feels_like, "10°C");
        assert_eq!(weather.condition, "多云");
        assert_eq!(weather.humidity, "40%");
        assert_eq!(weather.visibility, "25 km");
        assert_eq!(weather.update_time, "2024-03-15T10:02+08:00");
    }

    #[test]
    fn test_parse_now_error_code() {
        let err = parse_now(r#"{"code": "401"}"#, "北京").unwrap_err();
        assert!(matches!(err, LemoError::Weather(_)));
        assert!(err.reason().contains("code=401"));
    }

    #[test]
    fn test_parse_now_fills_missing_fields() {
        let weather = parse_now(r#"{"code": "200", "now": {"temp": "5"}}"#, "拉萨").unwrap();
        assert_eq!(weather.temperature, "5°C");
        assert_eq!(weather.condition, "未知");
        assert_eq!(weather.pressure, "N/A hPa");
    }

    #[tokio::test]
    async fn test_missing_api_key_is_failure() {
        let provider = QWeatherProvider::new(&WeatherConfig::default()).unwrap();
        let err = provider.lookup_current("北京").await.unwrap_err();
        assert!(err.reason().contains("QWEATHER_API_KEY"));
    }
}
