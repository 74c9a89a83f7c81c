//! Sample journey type used when the worker is started with `--demo-journeys`.

use chrono::Duration;
use tracing::info;

use stepper_core::{HeroRef, StepperResult};
use stepper_journey::{
    Conditional, Flow, JourneyDefinition, JourneyEngine, NewJourney, OnException, StepSpec,
};

pub const ONBOARDING: &str = "onboarding";

/// Welcome message right away, a nudge a minute later unless the account
/// activated in between, and a wrap-up five minutes after that.
pub fn onboarding() -> StepperResult<JourneyDefinition> {
    JourneyDefinition::builder(ONBOARDING)
        .cancel_if(Conditional::callable(|journey| {
            journey
                .attribute("unsubscribed")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
        }))
        .step(StepSpec::named("welcome").run(|ctx| {
            info!(hero = ?ctx.hero(), "Sending welcome message");
            ctx.set_attribute("welcomed_at", ctx.now().to_rfc3339());
            ctx.save()?;
            Ok(Flow::Continue)
        }))
        .step(
            StepSpec::named("nudge")
                .wait(Duration::minutes(1))
                .on_exception(OnException::Reattempt)
                .skip_if(Conditional::callable(|journey| {
                    journey.attribute("activated").is_some()
                }))
                .run(|ctx| {
                    info!(hero = ?ctx.hero(), "Nudging inactive account");
                    Ok(Flow::Continue)
                }),
        )
        .step(
            StepSpec::named("wrap_up")
                .wait(Duration::minutes(5))
                .run(|ctx| {
                    info!(
                        hero = ?ctx.hero(),
                        welcomed_at = ?ctx.attribute("welcomed_at"),
                        "Onboarding complete"
                    );
                    ctx.finish()
                }),
        )
        .build()
}

/// Registers the onboarding journey type and starts `count` journeys.
pub fn seed(engine: &JourneyEngine, count: usize) -> StepperResult<()> {
    engine.register(onboarding()?)?;
    for n in 0..count {
        engine.create(ONBOARDING, NewJourney::for_hero(HeroRef::new("Account", n)))?;
    }
    info!(count, "Started demo journeys");
    Ok(())
}
