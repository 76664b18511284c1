use crate::commands::{build_runtime, load_config, open_pool, CommandFailure, CommandResult};
use echoshop_db::{migrations, DemoCatalog, SeedResult};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seeded = DemoCatalog::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoCatalog::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<SeedResult, CommandFailure> = if verification.all_present {
            Ok(seeded)
        } else {
            Err(("seed_verification", verification_failure_message(&verification.checks), 6u8))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", summary_message(&seeded)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary_message(seeded: &SeedResult) -> String {
    format!(
        "demo catalog loaded: {} categories, {} products, {} orders, {} events; try `echoshop recommend --user {}`",
        seeded.categories, seeded.products, seeded.orders, seeded.events, seeded.demo_user_id
    )
}

fn verification_failure_message(checks: &[(&'static str, bool)]) -> String {
    let failed_checks =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect::<Vec<_>>();

    if failed_checks.is_empty() {
        "some demo catalog data failed to load".to_string()
    } else {
        format!("demo catalog verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::{summary_message, verification_failure_message};
    use echoshop_db::{SeedResult, DEMO_USER_ID};

    #[test]
    fn verification_error_message_targets_failed_checks() {
        let checks = [("categories", true), ("demo-cart", false), ("recent-orders", false)];

        assert_eq!(
            verification_failure_message(&checks),
            "demo catalog verification failed for checks: demo-cart, recent-orders"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        let checks = [("categories", true), ("analytics-events", true)];

        assert_eq!(verification_failure_message(&checks), "some demo catalog data failed to load");
    }

    #[test]
    fn summary_points_at_the_demo_shopper() {
        let seeded = SeedResult {
            categories: 5,
            products: 16,
            orders: 6,
            events: 6,
            demo_user_id: DEMO_USER_ID,
        };

        let message = summary_message(&seeded);
        assert!(message.starts_with("demo catalog loaded: 5 categories, 16 products"));
        assert!(message.ends_with("`echoshop recommend --user user-demo`"));
    }
}
