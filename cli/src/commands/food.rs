use anyhow::{Result, bail};

use fittrack_core::{FitnessViewModel, Food};

use super::helpers::{no_neg_zero, parse_nutrient_assignment, print_food_table, print_nutrition_table};
use super::require_food;

pub(crate) async fn cmd_food_add(
    vm: &FitnessViewModel,
    name: &str,
    unit: &str,
    size: f64,
    nutrients: &[String],
    json: bool,
) -> Result<()> {
    let mut food = Food::new(name, unit, size)?;
    for assignment in nutrients {
        let (nutrient, amount) = parse_nutrient_assignment(assignment)?;
        food.nutrition_mut().set(nutrient, amount)?;
    }

    vm.insert_foods(vec![food.clone()]).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&food)?);
    } else {
        println!(
            "Added: {} (ID: {}) - {} {} per serving, {} kcal",
            food.name(),
            food.id(),
            no_neg_zero(food.serving_size()),
            food.serving_unit(),
            food.nutrition().calories()
        );
    }
    Ok(())
}

pub(crate) async fn cmd_food_list(
    vm: &FitnessViewModel,
    search: Option<String>,
    pattern: Option<String>,
    json: bool,
) -> Result<()> {
    let foods = if let Some(pattern) = pattern {
        vm.find_foods_by_name(pattern).await?
    } else {
        vm.set_food_search(search.unwrap_or_default());
        vm.foods().first().await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&foods)?);
    } else if foods.is_empty() {
        eprintln!("No foods found. Use `fittrack food add` to add one.");
    } else {
        print_food_table(&foods);
    }
    Ok(())
}

pub(crate) async fn cmd_food_show(vm: &FitnessViewModel, id: i64, json: bool) -> Result<()> {
    let food = require_food(vm, id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&food)?);
    } else {
        println!("{} (ID: {})", food.name(), food.id());
        println!(
            "Serving: {} {}",
            no_neg_zero(food.serving_size()),
            food.serving_unit()
        );
        print_nutrition_table(food.nutrition(), &[]);
    }
    Ok(())
}

pub(crate) async fn cmd_food_rename(
    vm: &FitnessViewModel,
    id: i64,
    name: &str,
    json: bool,
) -> Result<()> {
    let mut food = require_food(vm, id).await?;
    let old_name = food.name().to_string();
    food.set_name(name)?;

    let updated = vm.update_foods(vec![food.clone()]).await?;
    if updated == 0 {
        bail!("Food {id} was removed before it could be renamed");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&food)?);
    } else {
        println!("Renamed '{old_name}' to '{}'", food.name());
    }
    Ok(())
}

pub(crate) async fn cmd_food_delete(vm: &FitnessViewModel, id: i64, json: bool) -> Result<()> {
    let food = require_food(vm, id).await?;
    let name = food.name().to_string();
    let deleted = vm.delete_foods(vec![food]).await?;

    if json {
        println!("{}", serde_json::json!({ "deleted": deleted > 0, "id": id }));
    } else if deleted > 0 {
        println!("Deleted '{name}' and its diary entries");
    } else {
        eprintln!("Food {id} was already gone");
    }
    Ok(())
}
