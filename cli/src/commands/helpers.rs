use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, NaiveDate, NaiveTime, Timelike};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use fittrack_core::models::now_millis;
use fittrack_core::{Food, Meal, Nutrient, NutritionGoal, NutritionInfo};

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

pub(crate) fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .with_context(|| format!("Invalid time '{s}'. Use HH:MM (24-hour)"))
}

/// Milliseconds since the epoch for a local date and time of day.
///
/// With neither given this is now; a missing time takes the current time of day.
pub(crate) fn resolve_timestamp(date: Option<String>, time: Option<String>) -> Result<i64> {
    if date.is_none() && time.is_none() {
        return Ok(now_millis());
    }
    let day = parse_date(date)?;
    let time_of_day = match time {
        Some(t) => parse_time(&t)?,
        None => {
            let now = Local::now().time();
            NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).unwrap_or(NaiveTime::MIN)
        }
    };
    local_millis(day, time_of_day)
}

/// Move `existing` to a new date and/or time of day, keeping whichever part
/// is not given.
pub(crate) fn retime(existing: i64, date: Option<String>, time: Option<String>) -> Result<i64> {
    let current = DateTime::from_timestamp_millis(existing)
        .context("Stored timestamp is out of range")?
        .with_timezone(&Local)
        .naive_local();
    let day = match date {
        Some(d) => parse_date(Some(d))?,
        None => current.date(),
    };
    let time_of_day = match time {
        Some(t) => parse_time(&t)?,
        None => current.time(),
    };
    local_millis(day, time_of_day)
}

fn local_millis(day: NaiveDate, time_of_day: NaiveTime) -> Result<i64> {
    let local = day
        .and_time(time_of_day)
        .and_local_timezone(Local)
        .earliest()
        .with_context(|| format!("{day} {time_of_day} does not exist in the local timezone"))?;
    Ok(local.timestamp_millis())
}

pub(crate) fn format_timestamp(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis).map_or_else(
        || "-".to_string(),
        |utc| utc.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
    )
}

/// Parse `name=amount`, e.g. `protein=12`.
pub(crate) fn parse_nutrient_assignment(s: &str) -> Result<(Nutrient, i32)> {
    let Some((name, amount)) = s.split_once('=') else {
        bail!("Invalid nutrient '{s}'. Use NUTRIENT=AMOUNT (e.g. calories=95)");
    };
    let nutrient: Nutrient = name.parse()?;
    let amount: i32 = amount
        .trim()
        .parse()
        .with_context(|| format!("Invalid amount for {nutrient}: '{amount}'"))?;
    Ok((nutrient, amount))
}

pub(crate) fn print_food_table(foods: &[Food]) {
    #[derive(Tabled)]
    struct FoodRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Serving")]
        serving: String,
        #[tabled(rename = "kcal")]
        calories: i32,
        #[tabled(rename = "Fat g")]
        fat: i32,
        #[tabled(rename = "Carbs g")]
        carbs: i32,
        #[tabled(rename = "Protein g")]
        protein: i32,
    }

    let rows: Vec<FoodRow> = foods
        .iter()
        .map(|f| FoodRow {
            id: f.id(),
            name: truncate(f.name(), 35),
            serving: format!("{} {}", no_neg_zero(f.serving_size()), f.serving_unit()),
            calories: f.nutrition().calories(),
            fat: f.nutrition().total_fat(),
            carbs: f.nutrition().total_carbs(),
            protein: f.nutrition().protein(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..7)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_meal_table(meals: &[Meal]) -> Result<()> {
    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "Entry")]
        id: i64,
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Food")]
        food: String,
        #[tabled(rename = "Servings")]
        servings: String,
        #[tabled(rename = "kcal")]
        calories: i32,
        #[tabled(rename = "Fat g")]
        fat: i32,
        #[tabled(rename = "Carbs g")]
        carbs: i32,
        #[tabled(rename = "Protein g")]
        protein: i32,
    }

    let mut rows = Vec::with_capacity(meals.len());
    for meal in meals {
        let eaten = meal.nutrition()?;
        rows.push(MealRow {
            id: meal.id(),
            time: format_timestamp(meal.time()),
            food: truncate(meal.food().name(), 30),
            servings: format!("{:.2}", no_neg_zero(meal.num_servings())),
            calories: eaten.calories(),
            fat: eaten.total_fat(),
            carbs: eaten.total_carbs(),
            protein: eaten.protein(),
        });
    }

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..8)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

/// One row per nutrient, with goal progress where a goal is set.
pub(crate) fn print_nutrition_table(info: &NutritionInfo, goals: &[NutritionGoal]) {
    #[derive(Tabled)]
    struct NutrientRow {
        #[tabled(rename = "Nutrient")]
        nutrient: String,
        #[tabled(rename = "Amount")]
        amount: String,
        #[tabled(rename = "Goal")]
        goal: String,
        #[tabled(rename = "%")]
        progress: String,
    }

    let rows: Vec<NutrientRow> = Nutrient::ALL
        .iter()
        .map(|&n| {
            let goal = goals.iter().find(|g| g.nutrient() == n);
            NutrientRow {
                nutrient: n.to_string(),
                amount: format!("{} {}", info.get(n), n.unit()),
                goal: goal.map_or_else(|| "-".into(), |g| format!("{} {}", g.amount(), n.unit())),
                progress: goal
                    .and_then(|g| g.progress(info))
                    .map_or_else(|| "-".into(), |p| format!("{:.0}%", p * 100.0)),
            }
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
