use sitespend_db::DemoSeedDataset;

use crate::commands::{
    connect_and_migrate, prepare, CommandResult, EXIT_EXECUTION, EXIT_VERIFICATION,
};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_and_migrate(&config).await?;

        let seeded = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_EXECUTION));
        let verified = match seeded {
            Ok(seeded) => DemoSeedDataset::verify(&pool)
                .await
                .map_err(|error| ("seed_verification", error.to_string(), EXIT_VERIFICATION))
                .and_then(|verification| {
                    if verification.all_present {
                        Ok(seeded)
                    } else {
                        Err((
                            "seed_verification",
                            verification_message(&verification.checks),
                            EXIT_VERIFICATION,
                        ))
                    }
                }),
            Err(failure) => Err(failure),
        };

        pool.close().await;
        verified
    });

    match result {
        Ok(seeded) => CommandResult::success(
            "seed",
            format!(
                "demo dataset loaded: sites [{}], users [{}]",
                seeded.sites_seeded.join(", "),
                seeded.users_seeded.join(", ")
            ),
        ),
        Err(failure) => CommandResult::from_step("seed", failure),
    }
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
