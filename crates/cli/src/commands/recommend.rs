use crate::commands::{build_runtime, load_config, open_pool, CommandFailure, CommandResult};
use echoshop_core::domain::user::UserId;
use echoshop_core::recommendations::{
    RecommendationEngine, RecommendationSet, RecommendationSettings,
};
use echoshop_db::SqlRecommendationStore;

pub fn run(user_id: &str, limit: Option<usize>) -> CommandResult {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return CommandResult::failure(
            "recommend",
            "invalid_argument",
            "--user must not be empty",
            2,
        );
    }

    let config = match load_config("recommend") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let runtime = match build_runtime("recommend") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let engine = RecommendationEngine::with_settings(
            SqlRecommendationStore::new(pool.clone()),
            RecommendationSettings::from(&config.recommendations),
        );

        let set = engine.recommend_detailed(&UserId(user_id.to_string()), limit).await;
        pool.close().await;
        Ok::<RecommendationSet, CommandFailure>(set)
    });

    match result {
        Ok(set) => CommandResult::success("recommend", render_set(&set)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("recommend", error_class, message, exit_code)
        }
    }
}

fn render_set(set: &RecommendationSet) -> String {
    let mut lines = vec![format!("{} recommendations for {}", set.items.len(), set.user_id.0)];

    for (rank, item) in set.items.iter().enumerate() {
        lines.push(format!(
            "{:>2}. {} {} (score {:.2}, via {})",
            rank + 1,
            item.product.id.0,
            item.product.name,
            item.score,
            item.source
        ));
    }

    if set.used_fallback {
        lines.push("no personalised candidates; showing top-rated products".to_string());
    }
    if set.is_degraded() {
        let sources = set.degraded_sources.iter().map(|source| source.as_str()).collect::<Vec<_>>();
        lines.push(format!("degraded sources: {}", sources.join(", ")));
    }

    lines.join("\n")
}
