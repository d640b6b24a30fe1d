use anyhow::Result;

use fittrack_core::{FitnessViewModel, Nutrient, NutritionGoal};

pub(crate) async fn cmd_goal_set(
    vm: &FitnessViewModel,
    nutrient: &str,
    amount: i32,
    json: bool,
) -> Result<()> {
    let nutrient: Nutrient = nutrient.parse()?;
    let goal = NutritionGoal::new(nutrient, amount)?;
    vm.upsert_goals(vec![goal.clone()]).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&goal)?);
    } else {
        println!("{nutrient}: {amount} {}/day", nutrient.unit());
    }
    Ok(())
}

pub(crate) async fn cmd_goal_show(vm: &FitnessViewModel, nutrient: &str, json: bool) -> Result<()> {
    let nutrient: Nutrient = nutrient.parse()?;
    let goal = vm.get_goal(nutrient).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&goal)?);
    } else if let Some(goal) = goal {
        println!("{nutrient}: {} {}/day", goal.amount(), nutrient.unit());
    } else {
        eprintln!("No goal set for {nutrient}. Use `fittrack goal set {nutrient} <amount>` to set one.");
    }
    Ok(())
}

pub(crate) async fn cmd_goal_list(vm: &FitnessViewModel, json: bool) -> Result<()> {
    let goals = vm.goals().first().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&goals)?);
    } else if goals.is_empty() {
        eprintln!("No goals set. Use `fittrack goal set <nutrient> <amount>` to set one.");
    } else {
        for goal in &goals {
            let nutrient = goal.nutrient();
            println!("{nutrient}: {} {}/day", goal.amount(), nutrient.unit());
        }
    }
    Ok(())
}
