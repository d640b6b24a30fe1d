mod diary;
mod food;
mod goal;
pub(crate) mod helpers;

use anyhow::{Context, Result, bail};

use fittrack_core::{FitnessViewModel, Food};

pub(crate) use diary::{cmd_diary, cmd_entry_delete, cmd_entry_update, cmd_log, cmd_sample};
pub(crate) use food::{cmd_food_add, cmd_food_delete, cmd_food_list, cmd_food_rename, cmd_food_show};
pub(crate) use goal::{cmd_goal_list, cmd_goal_set, cmd_goal_show};

/// Look up a stored food, failing with a readable message when it is missing.
pub(super) async fn require_food(vm: &FitnessViewModel, id: i64) -> Result<Food> {
    vm.get_food(id)
        .await?
        .with_context(|| format!("Food {id} not found. Use `fittrack food list` to see IDs"))
}

pub(crate) async fn cmd_clear(vm: &FitnessViewModel, yes: bool, json: bool) -> Result<()> {
    if !yes {
        bail!("This deletes every food, diary entry and goal. Re-run with --yes to confirm");
    }
    vm.clear_all_tables().await?;

    if json {
        println!("{}", serde_json::json!({ "cleared": true }));
    } else {
        println!("Cleared all foods, diary entries and goals");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fittrack_core::models::day_start_millis;
    use fittrack_core::{Dao, Database, Nutrient, WorkerPool};

    use super::*;
    use crate::commands::helpers::parse_date;

    fn view_model() -> FitnessViewModel {
        let db = Arc::new(Database::open_in_memory().unwrap());
        FitnessViewModel::new(db, WorkerPool::new(2).unwrap())
    }

    fn nutrients(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_food_add_rename_delete() {
        let vm = view_model();
        cmd_food_add(&vm, "Apple", "grams", 100.0, &nutrients(&["calories=52"]), true)
            .await
            .unwrap();

        let foods = vm.database().food_dao().get_all().unwrap();
        assert_eq!(foods.len(), 1);
        assert_eq!(foods[0].nutrition().calories(), 52);
        let id = foods[0].id();

        cmd_food_rename(&vm, id, "Fuji", true).await.unwrap();
        assert_eq!(vm.database().food_dao().find_by_name("Fuji").unwrap().len(), 1);

        cmd_food_show(&vm, id, true).await.unwrap();
        cmd_food_list(&vm, Some("fu".into()), None, true).await.unwrap();

        cmd_food_delete(&vm, id, true).await.unwrap();
        assert_eq!(vm.database().food_dao().count().unwrap(), 0);
        assert!(cmd_food_show(&vm, id, true).await.is_err());
    }

    #[tokio::test]
    async fn test_food_add_rejects_bad_input() {
        let vm = view_model();
        assert!(cmd_food_add(&vm, "Apple", "grams", -1.0, &[], true).await.is_err());
        assert!(
            cmd_food_add(&vm, "Apple", "grams", 1.0, &nutrients(&["dietary_fiber=-2"]), true)
                .await
                .is_err()
        );
        assert_eq!(vm.database().food_dao().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_log_update_and_delete_entry() {
        let vm = view_model();
        cmd_food_add(&vm, "Egg", "units", 1.0, &nutrients(&["calories=78"]), true)
            .await
            .unwrap();
        let food_id = vm.database().food_dao().get_all().unwrap()[0].id();

        cmd_log(
            &vm,
            food_id,
            2.0,
            Some("2024-05-01".into()),
            Some("08:00".into()),
            true,
        )
        .await
        .unwrap();

        let day = parse_date(Some("2024-05-01".into())).unwrap();
        let start = day_start_millis(day);
        let entries = vm.database().diary_dao().get_range(start, start + 86_400_000).unwrap();
        assert_eq!(entries.len(), 1);
        let entry_id = entries[0].id();

        cmd_entry_update(&vm, entry_id, Some(3.0), None, Some("09:30".into()), true)
            .await
            .unwrap();
        let updated = vm.database().diary_dao().get(entry_id).unwrap().unwrap();
        assert_eq!(updated.num_servings(), 3.0);
        assert!(updated.time() > entries[0].time());

        cmd_diary(&vm, Some("2024-05-01".into()), false, true).await.unwrap();

        cmd_entry_delete(&vm, entry_id, true).await.unwrap();
        assert!(vm.database().diary_dao().get_all().unwrap().is_empty());
        assert!(cmd_entry_delete(&vm, entry_id, true).await.is_err());
    }

    #[tokio::test]
    async fn test_entry_update_requires_a_change() {
        let vm = view_model();
        assert!(cmd_entry_update(&vm, 1, None, None, None, true).await.is_err());
    }

    #[tokio::test]
    async fn test_log_unknown_food_fails() {
        let vm = view_model();
        assert!(cmd_log(&vm, 7, 1.0, None, None, true).await.is_err());
    }

    #[tokio::test]
    async fn test_goals() {
        let vm = view_model();
        cmd_goal_set(&vm, "calories", 2000, true).await.unwrap();
        cmd_goal_set(&vm, "calories", 1800, true).await.unwrap();
        cmd_goal_set(&vm, "protein", 60, true).await.unwrap();
        assert!(cmd_goal_set(&vm, "caffeine", 1, true).await.is_err());
        assert!(cmd_goal_set(&vm, "iron", -1, true).await.is_err());

        let goals = vm.database().goal_dao().get_all().unwrap();
        assert_eq!(goals.len(), 2);
        let calories = vm.database().goal_dao().get(Nutrient::Calories).unwrap().unwrap();
        assert_eq!(calories.amount(), 1800);

        cmd_goal_show(&vm, "protein", true).await.unwrap();
        cmd_goal_show(&vm, "iron", true).await.unwrap();
        cmd_goal_list(&vm, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_sample_and_clear() {
        let vm = view_model();
        cmd_sample(&vm, 3, true).await.unwrap();
        assert_eq!(vm.database().diary_dao().get_all_meals().unwrap().len(), 3);

        cmd_diary(&vm, None, true, true).await.unwrap();

        assert!(cmd_clear(&vm, false, true).await.is_err());
        assert_eq!(vm.database().food_dao().count().unwrap(), 3);

        cmd_clear(&vm, true, true).await.unwrap();
        assert_eq!(vm.database().food_dao().count().unwrap(), 0);
        assert!(vm.database().diary_dao().get_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_on_disk_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fittrack.db");
        {
            let db = Arc::new(Database::open(&path).unwrap());
            let vm = FitnessViewModel::new(db, WorkerPool::new(1).unwrap());
            cmd_food_add(&vm, "Bread", "slice", 1.0, &[], true).await.unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.food_dao().count().unwrap(), 1);
    }
}
