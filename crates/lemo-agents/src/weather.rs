//! Weather specialist
//!
//! Answers by chaining three steps: resolve the time qualifier, extract the
//! place name, then query the weather provider for that place.

use crate::agent::{AgentReply, SpecializedAgent};
use async_trait::async_trait;
use chrono::{Days, Local, NaiveDate};
use futures::FutureExt;
use lemo_common::{LemoError, Result, sources};
use lemo_llm::ChatTurn;
use lemo_tools::{CurrentWeather, WeatherProvider};
use regex::Regex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const WEATHER_KEYWORDS: [&str; 18] = [
    "天气", "气温", "温度", "下雨", "晴天", "阴天", "多云", "刮风", "风力", "湿度", "降雨", "降水",
    "雾霾", "空气", "穿什么", "需要带伞", "热不热", "冷不冷",
];

/// Ordered patterns; the first capture group is the place candidate
const PLACE_PATTERNS: [&str; 3] = [
    r"([\x{4e00}-\x{9fa5}]{2,10}?)(?:市|区|县|镇)?(?:的)?(?:天气|气温|温度)",
    r"(?:天气|气温|温度).*?([\x{4e00}-\x{9fa5}]{2,10}?)(?:市|区|县|镇)?",
    r"([\x{4e00}-\x{9fa5}]{2,10}?)(?:市|区|县|镇)(?:的)?(?:天气|气温|温度)?",
];

const NON_PLACES: [&str; 9] = ["今天", "明天", "后天", "现在", "怎么样", "如何", "多少", "什么", "怎么"];

/// Removed before place extraction so they cannot be captured as part of a place
const NOISE_TOKENS: [&str; 12] = [
    "请问", "帮我查一下", "帮我查", "查一下", "查询", "今天", "明天", "明日", "后天", "现在", "今日",
    "此刻",
];

const CLARIFICATION: &str =
    "抱歉，我没有识别到您要查询的城市。请告诉我具体的城市名称，例如：北京的天气怎么样？";

/// Which day the user is asking about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeQualifier {
    Today,
    Tomorrow,
    DayAfterTomorrow,
}

impl TimeQualifier {
    /// Detect the qualifier in a message, defaulting to today
    pub fn detect(message: &str) -> Self {
        let lower = message.to_lowercase();
        if message.contains("明天") || message.contains("明日") {
            TimeQualifier::Tomorrow
        } else if message.contains("后天") || lower.contains("day after tomorrow") {
            TimeQualifier::DayAfterTomorrow
        } else if lower.contains("tomorrow") {
            TimeQualifier::Tomorrow
        } else {
            TimeQualifier::Today
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimeQualifier::Today => "今天",
            TimeQualifier::Tomorrow => "明天",
            TimeQualifier::DayAfterTomorrow => "后天",
        }
    }

    fn offset_days(&self) -> u64 {
        match self {
            TimeQualifier::Today => 0,
            TimeQualifier::Tomorrow => 1,
            TimeQualifier::DayAfterTomorrow => 2,
        }
    }
}

/// A time qualifier resolved against a calendar date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeContext {
    pub qualifier: TimeQualifier,
    pub date: NaiveDate,
}

impl TimeContext {
    pub fn resolve(message: &str, today: NaiveDate) -> Self {
        let qualifier = TimeQualifier::detect(message);
        let date = today
            .checked_add_days(Days::new(qualifier.offset_days()))
            .unwrap_or(today);
        Self { qualifier, date }
    }

    pub fn describe(&self) -> String {
        format!("{}（{}）", self.qualifier.label(), self.date.format("%Y年%m月%d日"))
    }
}

/// Extracts place names from weather questions
pub struct PlaceExtractor {
    patterns: Vec<Regex>,
}

impl PlaceExtractor {
    pub fn new() -> Result<Self> {
        let patterns = PLACE_PATTERNS
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| LemoError::Config(format!("Invalid place pattern: {}", e)))?;
        Ok(Self { patterns })
    }

    fn is_non_place(candidate: &str) -> bool {
        NON_PLACES
            .iter()
            .any(|stop| candidate.starts_with(stop) || stop.starts_with(candidate))
    }

    /// First acceptable place candidate, trying each pattern in order
    pub fn extract(&self, message: &str) -> Option<String> {
        let cleaned = NOISE_TOKENS
            .iter()
            .fold(message.to_string(), |text, token| text.replace(token, ""));

        self.patterns.iter().find_map(|pattern| {
            let candidate = pattern.captures(&cleaned)?.get(1)?.as_str();
            if Self::is_non_place(candidate) {
                debug!("Rejected place candidate {:?}", candidate);
                None
            } else {
                Some(candidate.to_string())
            }
        })
    }
}

pub fn format_weather(time: &TimeContext, place: &str, w: &CurrentWeather) -> String {
    format!(
        "{}{}的天气情况如下：\n\n\
         **温度**：{}（体感 {}）\n\
         **天气**：{}\n\
         **风力**：{} {}级\n\
         **湿度**：{}\n\
         **能见度**：{}\n\n\
         数据更新时间：{}",
        time.describe(),
        place,
        w.temperature,
        w.feels_like,
        w.condition,
        w.wind_dir,
        w.wind_scale,
        w.humidity,
        w.visibility,
        w.update_time
    )
}

/// Agent answering weather questions from a weather provider
pub struct WeatherAgent {
    provider: Arc<dyn WeatherProvider>,
    places: PlaceExtractor,
}

impl WeatherAgent {
    pub fn new(provider: Arc<dyn WeatherProvider>) -> Result<Self> {
        Ok(Self {
            provider,
            places: PlaceExtractor::new()?,
        })
    }

    async fn run_chain(
        &self,
        message: &str,
        today: NaiveDate,
        tools_used: &mut Vec<String>,
    ) -> AgentReply {
        let time = TimeContext::resolve(message, today);
        tools_used.push("time_parser".to_string());
        info!("[weather 1/3] time: {}", time.describe());

        tools_used.push("place_parser".to_string());
        let Some(place) = self.places.extract(message) else {
            return AgentReply::new(CLARIFICATION, sources::WEATHER_AGENT, 0.3);
        };
        info!("[weather 2/3] place: {}", place);

        tools_used.push("weather_api".to_string());
        match self.provider.lookup_current(&place).await {
            Ok(weather) => {
                info!("[weather 3/3] {} {}", weather.temperature, weather.condition);
                AgentReply::new(
                    format_weather(&time, &place, &weather),
                    sources::WEATHER_API,
                    0.95,
                )
            }
            Err(e) => {
                warn!("Weather lookup for {} failed: {}", place, e);
                AgentReply::new(
                    format!("抱歉，获取{}的天气信息失败。{}", place, e.reason()),
                    sources::WEATHER_AGENT,
                    0.5,
                )
            }
        }
    }

    pub(crate) async fn chat_on(&self, message: &str, today: NaiveDate) -> AgentReply {
        let mut tools_used = Vec::new();
        let outcome = AssertUnwindSafe(self.run_chain(message, today, &mut tools_used))
            .catch_unwind()
            .await;
        let reply = match outcome {
            Ok(reply) => reply,
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "未知错误".to_string());
                error!("Weather agent panicked: {}", detail);
                AgentReply::new(
                    format!("抱歉，天气查询过程中出现错误：{}", detail),
                    sources::WEATHER_AGENT,
                    0.3,
                )
            }
        };
        reply.with_tools(tools_used)
    }
}

#[async_trait]
impl SpecializedAgent for WeatherAgent {
    fn name(&self) -> &str {
        "天气专家"
    }

    fn description(&self) -> &str {
        "专门处理天气查询相关的问题"
    }

    fn tools(&self) -> Vec<String> {
        vec![
            "time_parser".to_string(),
            "place_parser".to_string(),
            "weather_api".to_string(),
        ]
    }

    async fn can_handle(&self, message: &str) -> Result<(bool, f32)> {
        let lower = message.to_lowercase();
        let count = WEATHER_KEYWORDS.iter().filter(|k| lower.contains(*k)).count();
        if count == 0 {
            return Ok((false, 0.0));
        }

        let confidence = (0.6 + 0.15 * count as f32).min(0.9);
        debug!("Weather keywords matched: {}, confidence {:.2}", count, confidence);
        Ok((true, confidence))
    }

    async fn chat(&self, message: &str, _history: &[ChatTurn]) -> AgentReply {
        self.chat_on(message, Local::now().date_naive()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StubWeather {
        fail_with: Option<&'static str>,
        asked: Mutex<Vec<String>>,
    }

    impl StubWeather {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                fail_with: None,
                asked: Mutex::new(Vec::new()),
            })
        }

        fn failing(reason: &'static str) -> Arc<Self> {
            Arc::new(Self {
                fail_with: Some(reason),
                asked: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl WeatherProvider for StubWeather {
        async fn lookup_current(&self, place: &str) -> Result<CurrentWeather> {
            self.asked.lock().unwrap().push(place.to_string());
            if let Some(reason) = self.fail_with {
                return Err(LemoError::Weather(reason.to_string()));
            }
            Ok(CurrentWeather {
                city: place.to_string(),
                temperature: "12°C".to_string(),
                feels_like: "10°C".to_string(),
                condition: "多云".to_string(),
                wind_dir: "东北风".to_string(),
                wind_scale: "3".to_string(),
                humidity: "40%".to_string(),
                pressure: "1012 hPa".to_string(),
                visibility: "25 km".to_string(),
                update_time: "2024-03-15T10:02+08:00".to_string(),
            })
        }
    }

    struct PanickingWeather;

    #[async_trait]
    impl WeatherProvider for PanickingWeather {
        async fn lookup_current(&self, _place: &str) -> Result<CurrentWeather> {
            panic!("malformed provider payload")
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[test]
    fn test_time_qualifier() {
        assert_eq!(TimeQualifier::detect("北京明天天气怎么样"), TimeQualifier::Tomorrow);
        assert_eq!(TimeQualifier::detect("后天会下雨吗"), TimeQualifier::DayAfterTomorrow);
        assert_eq!(TimeQualifier::detect("weather tomorrow"), TimeQualifier::Tomorrow);
        assert_eq!(
            TimeQualifier::detect("Weather the day after tomorrow"),
            TimeQualifier::DayAfterTomorrow
        );
        assert_eq!(TimeQualifier::detect("上海天气"), TimeQualifier::Today);
    }

    #[test]
    fn test_time_context_resolves_date() {
        let time = TimeContext::resolve("明天天气", day());
        assert_eq!(time.date, NaiveDate::from_ymd_opt(2024, 3, 16).unwrap());
        assert_eq!(time.describe(), "明天（2024年03月16日）");

        let time = TimeContext::resolve("后天呢 天气", NaiveDate::from_ymd_opt(2024, 2, 28).unwrap());
        assert_eq!(time.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn test_place_extraction() {
        let places = PlaceExtractor::new().unwrap();
        assert_eq!(places.extract("北京明天天气怎么样").as_deref(), Some("北京"));
        assert_eq!(places.extract("上海的天气").as_deref(), Some("上海"));
        assert_eq!(places.extract("请问广州市今天气温多少").as_deref(), Some("广州"));
        assert_eq!(places.extract("通州区的温度").as_deref(), Some("通州"));
        assert_eq!(places.extract("今天天气怎么样"), None);
        assert_eq!(places.extract("天气如何"), None);
    }

    #[tokio::test]
    async fn test_bids() {
        let agent = WeatherAgent::new(StubWeather::ok()).unwrap();
        assert_eq!(agent.can_handle("你好").await.unwrap(), (false, 0.0));

        let (yes, confidence) = agent.can_handle("北京天气怎么样").await.unwrap();
        assert!(yes);
        assert!((confidence - 0.75).abs() < 1e-6);

        let (_, confidence) = agent.can_handle("天气冷不冷，需要带伞吗，会下雨吗").await.unwrap();
        assert!((confidence - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_chain_success() {
        let provider = StubWeather::ok();
        let agent = WeatherAgent::new(provider.clone()).unwrap();
        let reply = agent.chat_on("北京明天天气怎么样", day()).await;

        assert_eq!(provider.asked.lock().unwrap().as_slice(), ["北京"]);
        assert_eq!(reply.answer_source, "weather_api");
        assert!((reply.confidence - 0.95).abs() < 1e-6);
        assert!(reply.answer.starts_with("明天（2024年03月16日）北京的天气情况如下"));
        assert!(reply.answer.contains("12°C"));
        assert_eq!(reply.tools_used, ["time_parser", "place_parser", "weather_api"]);
    }

    #[tokio::test]
    async fn test_provider_failure_is_degraded_reply() {
        let agent = WeatherAgent::new(StubWeather::failing("天气 API 请求失败: HTTP 403")).unwrap();
        let reply = agent.chat_on("北京明天天气怎么样", day()).await;

        assert!((reply.confidence - 0.5).abs() < 1e-6);
        assert!(reply.answer.contains("HTTP 403"));
        assert_eq!(reply.answer_source, "weather_agent");
    }

    #[tokio::test]
    async fn test_missing_place_asks_for_clarification() {
        let provider = StubWeather::ok();
        let agent = WeatherAgent::new(provider.clone()).unwrap();
        let reply = agent.chat("今天天气怎么样", &[]).await;

        assert!((reply.confidence - 0.3).abs() < 1e-6);
        assert_eq!(reply.answer, CLARIFICATION);
        assert!(provider.asked.lock().unwrap().is_empty());
        assert_eq!(reply.tools_used, ["time_parser", "place_parser"]);
    }

    #[tokio::test]
    async fn test_provider_panic_is_apology() {
        let agent = WeatherAgent::new(Arc::new(PanickingWeather)).unwrap();
        let reply = agent.chat_on("北京明天天气怎么样", day()).await;

        assert!((reply.confidence - 0.3).abs() < 1e-6);
        assert_eq!(reply.answer_source, "weather_agent");
        assert!(reply.answer.contains("malformed provider payload"));
        assert_eq!(reply.tools_used, ["time_parser", "place_parser", "weather_api"]);
    }
}
