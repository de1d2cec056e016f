use std::time::Duration;

use gust_runner::prelude::{run, GustResult, HookResult, Scenario, UserContext};

struct FlakyScenario;

impl Scenario for FlakyScenario {
    /// Number of iterations this user has attempted
    type Session = u64;

    fn setup(&self, _user: &mut UserContext) -> anyhow::Result<u64> {
        Ok(0)
    }

    fn run_iteration(&self, user: &mut UserContext, attempts: &mut u64) -> HookResult {
        *attempts += 1;

        user.timed_step("work", || {
            std::thread::sleep(Duration::from_millis(5));
            Ok(())
        })?;

        // Every other iteration fails, which the runner must record and survive
        if *attempts % 2 == 1 {
            anyhow::bail!("flaky failure on attempt {attempts}");
        }

        Ok(())
    }
}

fn main() -> GustResult<()> {
    let cli = gust_runner::prelude::init();
    let spec = cli.into_spec(env!("CARGO_PKG_NAME"));

    run(spec, FlakyScenario)?;

    Ok(())
}
