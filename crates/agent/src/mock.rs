//! Deterministic offline LLM used when no API key is configured and throughout the tests.
//!
//! Keyword rules pick at most one tool call per user utterance. Once tool results are in the
//! conversation the mock answers with a one-sentence summary of the latest result instead of
//! calling another tool.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use hostline_core::domain::call::Role;
use hostline_core::domain::restaurant::RestaurantProfile;

use crate::llm::{ChatMessage, Completion, CompletionRequest, LlmClient, ToolCall};
use crate::tools::{Clock, SystemClock};

static MENU: Lazy<Regex> = Lazy::new(|| {
    pattern(r"menu|categories|what (do you|you guys) (have|offer)|what.s on the menu")
});
static CATEGORY: Lazy<Regex> =
    Lazy::new(|| pattern(r"(what|any|show).*(starters|appetizers|main course|desserts|drinks)"));
static DIETARY: Lazy<Regex> =
    Lazy::new(|| pattern(r"(vegetarian|vegan|gluten.free|dairy.free|nut.free|halal|kosher)"));
static DISH_SEARCH: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"(do you have|is there|looking for|want|i.d like) .*?(chicken|curry|paneer|biryani|naan|tandoori|tikka)",
    )
});
static SPECIALS: Lazy<Regex> = Lazy::new(|| pattern(r"special|offer|discount|deal|promotion"));
static BOOKING: Lazy<Regex> = Lazy::new(|| {
    pattern(r"(book|reserve|reservation).*(table|spot|seat|reservation).*?(\d+).*?(people|person|guests?)")
});
static CLOCK_TIME: Lazy<Regex> = Lazy::new(|| pattern(r"(\d{1,2})(?::(\d{2}))?\s*(am|pm)"));

static GREETING: Lazy<Regex> = Lazy::new(|| pattern(r"^(hi|hello|hey|greetings|howdy)"));
static HOURS: Lazy<Regex> =
    Lazy::new(|| pattern(r"(hour|time|when).*(open|close|opening|closing)"));
static LOCATION: Lazy<Regex> = Lazy::new(|| pattern(r"(where|location|address|direction)"));
static PARKING: Lazy<Regex> = Lazy::new(|| pattern(r"parking"));
static TAKEOUT: Lazy<Regex> =
    Lazy::new(|| pattern(r"(takeout|take.out|take.away|delivery|pick.up)"));
static POPULAR: Lazy<Regex> =
    Lazy::new(|| pattern(r"(popular|best|recommend|signature|specialty)"));
static SPICE: Lazy<Regex> = Lazy::new(|| pattern(r"(spicy|spice|hot|mild|medium)"));

fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("static mock pattern compiles")
}

const NO_USER_MESSAGE: &str = "I'm not sure how to respond without a user message.";
const LOOKED_IT_UP: &str =
    "I've looked that up for you. Is there anything specific you'd like to know about our restaurant?";

/// A tool call the keyword rules chose, with the sentence spoken before it runs.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolIntent {
    pub lead_in: String,
    pub tool_name: &'static str,
    pub arguments: Value,
}

pub struct MockLlmClient {
    profile: RestaurantProfile,
    clock: Arc<dyn Clock>,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new(RestaurantProfile::default())
    }
}

impl MockLlmClient {
    pub fn new(profile: RestaurantProfile) -> Self {
        Self { profile, clock: Arc::new(SystemClock) }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn canned_reply(&self, user_text: &str) -> String {
        let text = normalize_text(user_text);
        let profile = &self.profile;

        if GREETING.is_match(&text) {
            format!("Hello! Thank you for calling {}. How can I assist you today?", profile.name)
        } else if HOURS.is_match(&text) {
            format!("We're open daily from {}.", profile.hours.label_12h())
        } else if LOCATION.is_match(&text) {
            format!("We're located at {}.", profile.address)
        } else if PARKING.is_match(&text) {
            "Yes, we have a parking lot behind our restaurant with free parking for customers. \
             There's also street parking available."
                .to_owned()
        } else if TAKEOUT.is_match(&text) {
            "Yes, we offer both takeout and delivery services. You can place an order by phone \
             or through our website. Delivery is available within a 5-mile radius."
                .to_owned()
        } else if POPULAR.is_match(&text) {
            "Our most popular dishes include Butter Chicken, Paneer Tikka, and our special \
             Vegetable Biryani. Our Chef's Special changes weekly, so be sure to ask about it \
             when you visit!"
                .to_owned()
        } else if SPICE.is_match(&text) {
            "We can adjust the spice level of most dishes to your preference, from mild to very \
             spicy. Just let us know your preference when ordering."
                .to_owned()
        } else {
            format!(
                "Thank you for your question. As an AI assistant for {}, I'm here to help with \
                 menu information, reservations, and general restaurant questions. How else can \
                 I assist you today?",
                profile.name
            )
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn provider(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        if request.messages.last().is_some_and(|message| message.role == Role::Tool) {
            return Ok(Completion::text(summarize_tool_results(&request.messages)));
        }

        let Some(user) = request.messages.iter().rev().find(|message| message.role == Role::User)
        else {
            return Ok(Completion::text(NO_USER_MESSAGE));
        };

        if !request.tools.is_empty() {
            let tomorrow = self.clock.now().date() + Duration::days(1);
            if let Some(intent) = classify_tool_intent(user.text(), tomorrow) {
                let call = ToolCall {
                    id: format!("mock_call_{}", request.messages.len()),
                    name: intent.tool_name.to_owned(),
                    arguments: intent.arguments,
                };
                return Ok(Completion { content: Some(intent.lead_in), tool_calls: vec![call] });
            }
        }

        Ok(Completion::text(self.canned_reply(user.text())))
    }
}

pub fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// First matching keyword rule wins; `booking_date` fills reservation checks.
pub fn classify_tool_intent(user_text: &str, booking_date: NaiveDate) -> Option<ToolIntent> {
    let text = normalize_text(user_text);

    if MENU.is_match(&text) {
        return Some(ToolIntent {
            lead_in: "Let me check our menu categories for you.".to_owned(),
            tool_name: "get_menu_categories",
            arguments: json!({}),
        });
    }

    if let Some(captures) = CATEGORY.captures(&text) {
        let category = captures.get(2).map_or("starters", |found| found.as_str());
        let category_id = match category {
            "main course" => 2,
            "desserts" => 5,
            "drinks" => 6,
            _ => 1,
        };
        return Some(ToolIntent {
            lead_in: format!("Let me check our {category} for you."),
            tool_name: "get_menu_items_by_category",
            arguments: json!({ "category_id": category_id }),
        });
    }

    if let Some(found) = DIETARY.find(&text) {
        let restriction = found.as_str().replace([' ', '-'], "_");
        return Some(ToolIntent {
            lead_in: format!("Let me find {restriction} options for you."),
            tool_name: "get_menu_items_by_dietary_restriction",
            arguments: json!({ "restriction_type": restriction }),
        });
    }

    if let Some(term) = DISH_SEARCH.captures(&text).and_then(|captures| captures.get(2)) {
        let term = term.as_str();
        return Some(ToolIntent {
            lead_in: format!("Let me search for {term} in our menu."),
            tool_name: "search_menu_items",
            arguments: json!({ "query": term }),
        });
    }

    if SPECIALS.is_match(&text) {
        return Some(ToolIntent {
            lead_in: "Let me check our current specials for you.".to_owned(),
            tool_name: "get_special_pricing",
            arguments: json!({}),
        });
    }

    let captures = BOOKING.captures(&text)?;
    let party_size: u32 = captures.get(3)?.as_str().parse().ok()?;
    Some(ToolIntent {
        lead_in: format!("Let me check if we have availability for {party_size} people."),
        tool_name: "check_reservation_availability",
        arguments: json!({
            "date": booking_date.format("%Y-%m-%d").to_string(),
            "time": spoken_time(&text).unwrap_or_else(|| "19:00".to_owned()),
            "party_size": party_size,
        }),
    })
}

/// `7pm` → `19:00`, `12:30 am` → `00:30`.
fn spoken_time(text: &str) -> Option<String> {
    let captures = CLOCK_TIME.captures(text)?;
    let mut hour: u32 = captures.get(1)?.as_str().parse().ok()?;
    let minute: u32 = captures.get(2).map_or(Some(0), |found| found.as_str().parse().ok())?;
    match captures.get(3)?.as_str() {
        "pm" if hour < 12 => hour += 12,
        "am" if hour == 12 => hour = 0,
        _ => {}
    }
    Some(format!("{hour:02}:{minute:02}"))
}

fn tool_name_for<'a>(messages: &'a [ChatMessage], call_id: &str) -> Option<&'a str> {
    messages
        .iter()
        .flat_map(|message| message.tool_calls.iter())
        .find(|call| call.id == call_id)
        .map(|call| call.name.as_str())
}

fn summarize_tool_results(messages: &[ChatMessage]) -> String {
    let Some(latest) = messages.iter().rev().find(|message| message.role == Role::Tool) else {
        return LOOKED_IT_UP.to_owned();
    };
    let tool = latest.tool_call_id.as_deref().and_then(|id| tool_name_for(messages, id));
    let Ok(result) = serde_json::from_str::<Value>(latest.text()) else {
        return LOOKED_IT_UP.to_owned();
    };

    if let Some(error) = result.get("error").and_then(Value::as_str) {
        return match result.get("alternatives").and_then(Value::as_array) {
            Some(alternatives) if !alternatives.is_empty() => {
                let slots: Vec<&str> = alternatives.iter().filter_map(Value::as_str).collect();
                format!("{error} We do have openings at {}.", spoken_list(&slots, "or"))
            }
            _ => format!("I'm sorry. {error}"),
        };
    }

    match tool {
        Some("get_menu_categories") => {
            let names = string_field(&result, "name", usize::MAX);
            format!(
                "We have several menu categories including {}. What would you like to know more about?",
                names.join(", ")
            )
        }
        Some(
            "get_menu_items_by_category"
            | "search_menu_items"
            | "get_menu_items_by_dietary_restriction",
        ) => {
            let names = string_field(&result, "name", 5);
            if names.is_empty() {
                "I couldn't find any matching dishes on our menu right now.".to_owned()
            } else {
                let refs: Vec<&str> = names.iter().map(String::as_str).collect();
                format!(
                    "We have {}. Would you like details on any of these?",
                    spoken_list(&refs, "and")
                )
            }
        }
        Some("get_special_pricing") => {
            let specials: Vec<String> = result
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|special| {
                    let name = special["item_name"].as_str()?;
                    let price = special["special_price"].as_f64()?;
                    Some(format!("{name} for ${price:.2}"))
                })
                .collect();
            if specials.is_empty() {
                "We don't have any specials running right now.".to_owned()
            } else {
                let refs: Vec<&str> = specials.iter().map(String::as_str).collect();
                format!("Our current specials are {}.", spoken_list(&refs, "and"))
            }
        }
        Some("check_reservation_availability") if result["available"] == json!(true) => format!(
            "Good news, we have a table for {} on {} at {}. May I have your name and phone number to confirm the booking?",
            result["party_size"], text_field(&result, "date"), text_field(&result, "time")
        ),
        Some("create_reservation") if result["success"] == json!(true) => format!(
            "Your table for {} is booked for {} at {}. Your reservation number is {}.",
            result["party_size"],
            text_field(&result, "date"),
            text_field(&result, "time"),
            result["reservation_id"]
        ),
        Some("cancel_reservation") if result["success"] == json!(true) => format!(
            "Your reservation for {} at {} has been canceled.",
            text_field(&result, "date"),
            text_field(&result, "time")
        ),
        _ => LOOKED_IT_UP.to_owned(),
    }
}

fn string_field(result: &Value, key: &str, limit: usize) -> Vec<String> {
    result
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|entry| entry[key].as_str().map(str::to_owned))
        .take(limit)
        .collect()
}

fn text_field<'a>(result: &'a Value, key: &str) -> &'a str {
    result[key].as_str().unwrap_or_default()
}

/// `["a", "b", "c"]` → `a, b and c`.
pub fn spoken_list(items: &[&str], conjunction: &str) -> String {
    match items {
        [] => String::new(),
        [only] => (*only).to_owned(),
        [head @ .., last] => format!("{} {conjunction} {last}", head.join(", ")),
    }
}
