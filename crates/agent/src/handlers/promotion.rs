use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use tracing::info;
use uuid::Uuid;
use waypoint_core::config::PromotionConfig;
use waypoint_core::{ConfigError, KeyInfo};

use super::{HandlerReply, IntentHandler, TurnContext};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Issued codes, at most one per session.
pub trait PromoCodeStore: Send + Sync {
    /// Returns the session's existing code, or stores and returns `candidate`.
    fn issue(&self, session_id: Uuid, candidate: String) -> String;

    fn code_for(&self, session_id: Uuid) -> Option<String>;
}

#[derive(Debug, Default)]
pub struct InMemoryPromoCodeStore {
    codes: Mutex<HashMap<Uuid, String>>,
}

impl InMemoryPromoCodeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PromoCodeStore for InMemoryPromoCodeStore {
    fn issue(&self, session_id: Uuid, candidate: String) -> String {
        let mut codes = match self.codes.lock() {
            Ok(codes) => codes,
            Err(poisoned) => poisoned.into_inner(),
        };
        codes.entry(session_id).or_insert(candidate).clone()
    }

    fn code_for(&self, session_id: Uuid) -> Option<String> {
        let codes = match self.codes.lock() {
            Ok(codes) => codes,
            Err(poisoned) => poisoned.into_inner(),
        };
        codes.get(&session_id).cloned()
    }
}

/// Daily window `[start_hour, end_hour)` in a fixed time zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PromotionWindow {
    pub timezone: Tz,
    pub start_hour: u32,
    pub end_hour: u32,
    pub discount_percent: u32,
}

impl PromotionWindow {
    pub fn from_config(config: &PromotionConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            timezone: config.time_zone()?,
            start_hour: config.start_hour,
            end_hour: config.end_hour,
            discount_percent: config.discount_percent,
        })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let hour = at.with_timezone(&self.timezone).hour();
        (self.start_hour..self.end_hour).contains(&hour)
    }

    /// e.g. `08:00 to 10:00 US/Pacific time`
    pub fn describe(&self) -> String {
        format!(
            "{:02}:00 to {:02}:00 {} time",
            self.start_hour,
            self.end_hour,
            self.timezone.name()
        )
    }
}

pub struct PromotionHandler {
    session_id: Uuid,
    window: PromotionWindow,
    clock: Arc<dyn Clock>,
    codes: Arc<dyn PromoCodeStore>,
}

impl PromotionHandler {
    pub fn new(
        session_id: Uuid,
        window: PromotionWindow,
        clock: Arc<dyn Clock>,
        codes: Arc<dyn PromoCodeStore>,
    ) -> Self {
        Self { session_id, window, clock, codes }
    }

    fn candidate_code(&self, now: DateTime<Utc>) -> String {
        let local_date = now.with_timezone(&self.window.timezone).format("%Y%m%d");
        let unique = Uuid::new_v4().simple().to_string();
        format!("EARLY{local_date}{}", unique[..8].to_ascii_uppercase())
    }
}

#[async_trait]
impl IntentHandler for PromotionHandler {
    fn name(&self) -> &'static str {
        "early_risers_promotion"
    }

    async fn handle(&mut self, _turn: &TurnContext<'_>) -> HandlerReply {
        let now = self.clock.now();
        let local = now.with_timezone(&self.window.timezone);
        let zone = self.window.timezone.name();
        let discount = self.window.discount_percent;

        if !self.window.contains(now) {
            return HandlerReply::plain(format!(
                "The Early Risers promotion is only available from {}. It's currently \
                 {:02}:{:02} {zone}. Come back tomorrow morning to catch the {discount}% discount!",
                self.window.describe(),
                local.hour(),
                local.minute(),
            ));
        }

        let code = self.codes.issue(self.session_id, self.candidate_code(now));
        info!(
            event_name = "promotion.code.issued",
            session_id = %self.session_id,
            code = %code,
            "early risers code issued"
        );

        let text = format!(
            "Good morning, early riser! You're up at {} {zone}.\n\n\
             Here's your exclusive Early Risers {discount}% discount code:\n\n\
             **{code}**\n\n\
             This code gives you {discount}% off your entire order. Use it at checkout.",
            local.format("%I:%M %p"),
        );
        HandlerReply::with_key_info(text, KeyInfo::generated_code(code))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;
    use waypoint_core::config::PromotionConfig;
    use waypoint_core::{AppConfig, ContextualInfo, ResolvedEntities};

    use super::{
        FixedClock, InMemoryPromoCodeStore, PromoCodeStore, PromotionHandler, PromotionWindow,
    };
    use crate::handlers::{HandlerReply, IntentHandler, TurnContext};

    fn config() -> PromotionConfig {
        AppConfig::default().promotion
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 15, hour, minute, 0).single().expect("valid instant")
    }

    async fn ask(handler: &mut PromotionHandler) -> HandlerReply {
        let entities = ResolvedEntities::new();
        let context = ContextualInfo::default();
        let query = "early risers code please";
        let turn = TurnContext { query, entities: &entities, context: &context };
        handler.handle(&turn).await
    }

    #[test]
    fn window_is_half_open_in_local_time() {
        let window = PromotionWindow::from_config(&config()).expect("window");
        // 15:00 UTC is 08:00 PDT in July.
        assert!(window.contains(at(15, 0)));
        assert!(window.contains(at(16, 59)));
        assert!(!window.contains(at(17, 0)));
        assert!(!window.contains(at(14, 59)));
        assert_eq!(window.describe(), "08:00 to 10:00 US/Pacific time");
    }

    #[test]
    fn unknown_time_zone_is_a_config_error() {
        let mut bad = config();
        bad.timezone = "Mars/Olympus".to_string();
        assert!(PromotionWindow::from_config(&bad).is_err());
    }

    #[tokio::test]
    async fn issues_one_code_per_session_inside_the_window() {
        let window = PromotionWindow::from_config(&config()).expect("window");
        let store = Arc::new(InMemoryPromoCodeStore::new());
        let clock = Arc::new(FixedClock(at(16, 30)));
        let session = Uuid::new_v4();
        let mut handler = PromotionHandler::new(session, window, clock.clone(), store.clone());

        let first = ask(&mut handler).await;
        let code = first.key_info.generated_code.clone().expect("code");
        assert!(code.starts_with("EARLY20260715"));
        assert_eq!(code.len(), "EARLY20260715".len() + 8);
        assert!(code["EARLY20260715".len()..]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert!(first.text.contains(&format!("**{code}**")));
        assert!(first.text.contains("10% discount code"));

        let second = ask(&mut handler).await;
        assert_eq!(second.key_info.generated_code.as_deref(), Some(code.as_str()));
        assert_eq!(store.code_for(session).as_deref(), Some(code.as_str()));

        let mut other = PromotionHandler::new(Uuid::new_v4(), window, clock, store);
        let other_code = ask(&mut other).await.key_info.generated_code.expect("code");
        assert_ne!(other_code, code);
    }

    #[tokio::test]
    async fn outside_the_window_reports_local_time_and_issues_nothing() {
        let window = PromotionWindow::from_config(&config()).expect("window");
        let store = Arc::new(InMemoryPromoCodeStore::new());
        let session = Uuid::new_v4();
        let mut handler =
            PromotionHandler::new(session, window, Arc::new(FixedClock(at(20, 5))), store.clone());

        let reply = ask(&mut handler).await;
        assert!(reply.text.contains("only available from 08:00 to 10:00 US/Pacific time"));
        assert!(reply.text.contains("It's currently 13:05 US/Pacific"));
        assert!(reply.key_info.generated_code.is_none());
        assert!(store.code_for(session).is_none());
    }
}
