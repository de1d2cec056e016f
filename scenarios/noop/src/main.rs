use std::time::Duration;

use gust_runner::prelude::{run, GustResult, HookResult, Scenario, UserContext};

struct NoopScenario;

impl Scenario for NoopScenario {
    type Session = ();

    fn setup(&self, _user: &mut UserContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn run_iteration(&self, user: &mut UserContext, _session: &mut ()) -> HookResult {
        user.timed_step("noop", || {
            std::thread::sleep(Duration::from_millis(10));
            Ok(())
        })?;
        Ok(())
    }
}

fn main() -> GustResult<()> {
    let cli = gust_runner::prelude::init();
    let spec = cli.into_spec(env!("CARGO_PKG_NAME"));

    run(spec, NoopScenario)?;

    Ok(())
}
