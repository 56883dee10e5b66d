use crate::commands::{prepare, CommandResult};
use hostline_db::{connect_with_config, migrations, RestaurantSeedDataset, SeedResult};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seed_result = RestaurantSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = RestaurantSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result = if verification.all_present {
            Ok(seed_result)
        } else {
            Err(("seed_verification", verification_message(&verification.checks), 6u8))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(seed_result) => CommandResult::success("seed", summary(&seed_result)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary(result: &SeedResult) -> String {
    format!(
        "restaurant dataset ready: {} menu items, {} tables, {} specials added, {} reservations added",
        result.menu_items, result.tables, result.specials_inserted, result.reservations_inserted
    )
}

fn verification_message(checks: &[(&'static str, bool)]) -> String {
    let failed_checks =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect::<Vec<_>>();
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use hostline_db::SeedResult;

    use super::{summary, verification_message};

    #[test]
    fn verification_error_message_targets_failed_checks() {
        let checks = [("menu-items", true), ("Weekend Special", false), ("Raj Patel", false)];

        assert_eq!(
            verification_message(&checks),
            "Seed verification failed for checks: Weekend Special, Raj Patel"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        let checks = [("menu-categories", true), ("ingredients", true)];

        assert_eq!(verification_message(&checks), "Some seed data failed to load");
    }

    #[test]
    fn summary_reports_inserted_rows() {
        let result =
            SeedResult { menu_items: 17, tables: 6, specials_inserted: 0, reservations_inserted: 0 };

        assert_eq!(
            summary(&result),
            "restaurant dataset ready: 17 menu items, 6 tables, 0 specials added, 0 reservations added"
        );
    }
}
