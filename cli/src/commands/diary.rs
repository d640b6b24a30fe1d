use anyhow::{Context, Result, bail};

use fittrack_core::{FitnessViewModel, Meal};

use super::helpers::{
    format_timestamp, parse_date, print_meal_table, print_nutrition_table, resolve_timestamp,
    retime,
};
use super::require_food;

pub(crate) async fn cmd_log(
    vm: &FitnessViewModel,
    food_id: i64,
    servings: f64,
    date: Option<String>,
    time: Option<String>,
    json: bool,
) -> Result<()> {
    let food = require_food(vm, food_id).await?;
    let timestamp = resolve_timestamp(date, time)?;
    let entry = vm.log_meal(food.id(), servings, timestamp)?.await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        let calories = food.nutrition().times(servings)?.calories();
        println!(
            "Logged: {servings} x {} ({calories} kcal) at {} [entry {}]",
            food.name(),
            format_timestamp(entry.time()),
            entry.id()
        );
    }
    Ok(())
}

pub(crate) async fn cmd_diary(
    vm: &FitnessViewModel,
    date: Option<String>,
    all: bool,
    json: bool,
) -> Result<()> {
    let day = if all {
        vm.set_diary_day(None);
        None
    } else {
        let day = parse_date(date)?;
        vm.select_date(day);
        Some(day)
    };

    let meals = vm.meals().first().await?;
    let totals = vm.daily_totals().first().await?;
    let goals = vm.goals().first().await?;

    if json {
        let out = serde_json::json!({
            "date": day.map(|d| d.to_string()),
            "meals": meals,
            "totals": totals,
            "goals": goals,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    match day {
        Some(d) => println!("Diary for {d}"),
        None => println!("All diary entries"),
    }
    if meals.is_empty() {
        eprintln!("No meals logged. Use `fittrack log <food-id>` to add one.");
        return Ok(());
    }
    print_meal_table(&meals)?;
    print_nutrition_table(&totals, &goals);
    Ok(())
}

pub(crate) async fn cmd_entry_update(
    vm: &FitnessViewModel,
    id: i64,
    servings: Option<f64>,
    date: Option<String>,
    time: Option<String>,
    json: bool,
) -> Result<()> {
    if servings.is_none() && date.is_none() && time.is_none() {
        bail!("Nothing to update. Pass --servings, --date or --time");
    }

    let mut meal = vm
        .get_meal(id)
        .await?
        .with_context(|| format!("Diary entry {id} not found"))?;
    if let Some(servings) = servings {
        meal.set_num_servings(servings)?;
    }
    if date.is_some() || time.is_some() {
        meal.set_time(retime(meal.time(), date, time)?);
    }

    let updated = vm.update_meals(vec![meal.clone()]).await?;
    if updated == 0 {
        bail!("Diary entry {id} was removed before it could be updated");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&meal)?);
    } else {
        println!(
            "Updated entry {id}: {} x {} at {}",
            meal.num_servings(),
            meal.food().name(),
            format_timestamp(meal.time())
        );
    }
    Ok(())
}

pub(crate) async fn cmd_entry_delete(vm: &FitnessViewModel, id: i64, json: bool) -> Result<()> {
    let entry = vm
        .get_diary_entry(id)
        .await?
        .with_context(|| format!("Diary entry {id} not found"))?;
    let deleted = vm.delete_diary_entries(vec![entry]).await?;

    if json {
        println!("{}", serde_json::json!({ "deleted": deleted > 0, "id": id }));
    } else if deleted > 0 {
        println!("Deleted entry {id}");
    } else {
        eprintln!("Entry {id} was already gone");
    }
    Ok(())
}

pub(crate) async fn cmd_sample(vm: &FitnessViewModel, count: u32, json: bool) -> Result<()> {
    let jobs: Vec<_> = (0..count).map(|_| vm.log_sample_meal()).collect();
    let mut meals: Vec<Meal> = Vec::with_capacity(jobs.len());
    for job in jobs {
        meals.push(job.await?);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&meals)?);
    } else {
        println!("Logged {} sample meal(s)", meals.len());
        print_meal_table(&meals)?;
    }
    Ok(())
}
