use livespot_common::models::TriggerContext;

/// Fallback body when a direct-DM trigger has no template.
pub const DEFAULT_TEMPLATE: &str = "Hi {username}!";

/// Substitutes `{username}`, `{cast_name}`, `{total_tokens}`, `{session_tokens}`,
/// `{segment}`, `{previous_segment}` and `{days_since_last_visit}`. Missing
/// values render as `0` or an empty string.
pub fn render_template(template: &str, ctx: &TriggerContext) -> String {
    template
        .replace("{username}", &ctx.user_name)
        .replace("{cast_name}", &ctx.cast_name)
        .replace("{total_tokens}", &ctx.total_tokens.unwrap_or(0).to_string())
        .replace("{session_tokens}", &ctx.session_tokens.unwrap_or(0).to_string())
        .replace("{segment}", ctx.segment.as_deref().unwrap_or(""))
        .replace("{previous_segment}", ctx.previous_segment.as_deref().unwrap_or(""))
        .replace("{days_since_last_visit}", &ctx.days_since_last_visit.unwrap_or(0).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_all_variables() {
        let mut ctx = TriggerContext::new("acc", "alice", "bob");
        ctx.total_tokens = Some(1200);
        ctx.segment = Some("S2".into());
        ctx.previous_segment = Some("S4".into());
        let out = render_template(
            "{username}@{cast_name}: {total_tokens}/{session_tokens} {previous_segment}->{segment} {days_since_last_visit}d {username}",
            &ctx,
        );
        assert_eq!(out, "bob@alice: 1200/0 S4->S2 0d bob");
    }

    #[test]
    fn default_template() {
        let ctx = TriggerContext::new("acc", "alice", "bob");
        assert_eq!(render_template(DEFAULT_TEMPLATE, &ctx), "Hi bob!");
    }
}
