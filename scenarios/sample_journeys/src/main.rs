use std::time::Duration;

use longevity_runner::prelude::*;

#[derive(Debug, Default)]
struct JourneyValues {
    screen: Option<&'static str>,
    visits: usize,
}

impl UserValuesConstraint for JourneyValues {}

/// How long each journey lingers on a screen, from `-e dwell_ms=...` or a profile's extras.
fn dwell(ctx: &JourneyContext<JourneyValues>) -> LongevityResult<Duration> {
    let millis = ctx.arguments().get_parsed::<u64>("dwell_ms")?.unwrap_or(500);
    Ok(Duration::from_millis(millis))
}

fn visit(ctx: &mut JourneyContext<JourneyValues>, screen: &'static str) -> HookResult {
    log::debug!("{} opening {}", ctx.journey(), screen);
    ctx.get_mut().screen = Some(screen);
    ctx.get_mut().visits += 1;
    ctx.pause(dwell(ctx)?)?;
    Ok(())
}

fn unlock_device(ctx: &mut JourneyContext<JourneyValues>) -> HookResult {
    visit(ctx, "lock_screen")
}

fn go_home(ctx: &mut JourneyContext<JourneyValues>) -> HookResult {
    ctx.get_mut().screen = Some("home");
    Ok(())
}

fn idle_home(ctx: &mut JourneyContext<JourneyValues>) -> HookResult {
    let rounds = ctx.arguments().get_parsed::<usize>("idle_rounds")?.unwrap_or(3);
    for _ in 0..rounds {
        visit(ctx, "home")?;
    }
    Ok(())
}

fn open_settings(ctx: &mut JourneyContext<JourneyValues>) -> HookResult {
    visit(ctx, "settings")?;
    if ctx.arguments().get("mode") == Some("deep") {
        visit(ctx, "settings/about")?;
    }
    anyhow::ensure!(
        ctx.get().screen.is_some_and(|s| s.starts_with("settings")),
        "settings did not open"
    );
    Ok(())
}

fn browse_gallery(ctx: &mut JourneyContext<JourneyValues>) -> HookResult {
    let photos = ctx.arguments().get_parsed::<usize>("photos")?.unwrap_or(5);
    for _ in 0..photos {
        ctx.interrupt_listener().check()?;
        visit(ctx, "gallery")?;
    }
    Ok(())
}

fn report_visits(ctx: &mut JourneyContext<JourneyValues>) -> HookResult {
    log::info!("{} visited {} screen(s)", ctx.journey(), ctx.get().visits);
    Ok(())
}

fn main() -> LongevityResult<()> {
    let builder = SuiteDefinitionBuilder::<JourneyValues>::new_with_init(env!("CARGO_PKG_NAME"))
        .with_default_profile_dir(concat!(env!("CARGO_MANIFEST_DIR"), "/profiles"))
        .use_journey(
            JourneyDefinitionBuilder::new("idle_home")
                .use_before_class(unlock_device)
                .use_body(idle_home)
                .use_after(go_home),
        )
        .use_journey(
            JourneyDefinitionBuilder::new("open_settings")
                .use_before_class(unlock_device)
                .use_before(go_home)
                .use_body(open_settings)
                .use_after(go_home)
                .use_after_class(report_visits),
        )
        .use_journey(
            JourneyDefinitionBuilder::new("browse_gallery")
                .use_before_class(unlock_device)
                .use_body(browse_gallery)
                .use_after(go_home)
                .use_after_class(report_visits),
        );

    let result = run(builder)?;
    if !result.was_successful() {
        anyhow::bail!(
            "{} of {} scenario(s) failed, {} skipped",
            result.failure_count(),
            result.run_count(),
            result.ignore_count()
        );
    }

    Ok(())
}
