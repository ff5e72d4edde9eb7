//! Status lines in a consistent format

use super::context::UiContext;
use console::style;

/// Section heading
pub fn heading(ctx: &UiContext, title: &str) {
    if ctx.is_styled() {
        println!("{}", style(title).cyan().bold());
    } else {
        println!("{}", title);
    }
}

/// Successful step
pub fn step_ok(ctx: &UiContext, message: &str) {
    if ctx.is_styled() {
        println!("  {} {}", style("✓").green(), message);
    } else {
        println!("  [OK] {}", message);
    }
}

/// Successful step with a dimmed detail
pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.is_styled() {
        println!("  {} {} ({})", style("✓").green(), message, style(detail).dim());
    } else {
        println!("  [OK] {} ({})", message, detail);
    }
}

/// Informational step
pub fn step_info(ctx: &UiContext, message: &str) {
    if ctx.is_styled() {
        println!("  {} {}", style("•").cyan(), message);
    } else {
        println!("  [INFO] {}", message);
    }
}

/// Warning with a suggestion
pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    if ctx.is_styled() {
        println!(
            "  {} {} - {}",
            style("!").yellow().bold(),
            message,
            style(hint).dim()
        );
    } else {
        println!("  [WARN] {} - {}", message, hint);
    }
}

/// Dimmed aside
pub fn remark(ctx: &UiContext, message: &str) {
    if ctx.is_styled() {
        println!("  {}", style(message).dim());
    } else {
        println!("  {}", message);
    }
}

/// Aligned key/value pair
pub fn key_value(ctx: &UiContext, key: &str, value: &str) {
    if ctx.is_styled() {
        println!("  {:<12} {}", style(key).dim(), value);
    } else {
        println!("  {:<12} {}", key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_output_does_not_panic() {
        let ctx = UiContext::plain();
        heading(&ctx, "Canopy");
        step_ok(&ctx, "done");
        step_ok_detail(&ctx, "saved", "/tmp/x");
        step_info(&ctx, "info");
        step_warn_hint(&ctx, "exists", "use --force");
        remark(&ctx, "aside");
        key_value(&ctx, "root", "/canopy");
    }
}
