//! Notification and stats message formatting.

use url::Url;

use crate::models::{MonitoringStats, SearchCriteria, Subscription};

/// Public search page the generated "view all" links point at.
const SEARCH_LINK_BASE: &str = "https://peek.tg/gifts";

/// Build a catalog search link reproducing the subscription's filters.
pub fn search_url(criteria: &SearchCriteria) -> String {
    let mut params: Vec<(&str, &str)> = vec![("gift", criteria.gift_name.as_str())];
    if let Some(ref model) = criteria.model {
        params.push(("model", model));
    }
    if let Some(ref background) = criteria.background {
        params.push(("background", background));
    }
    if let Some(ref pattern) = criteria.pattern {
        params.push(("pattern", pattern));
    }

    match Url::parse_with_params(SEARCH_LINK_BASE, &params) {
        Ok(url) => url.to_string(),
        Err(_) => SEARCH_LINK_BASE.to_string(),
    }
}

/// Markdown change notification for a subscriber.
pub fn format_change_notification(
    subscription: &Subscription,
    old_count: i64,
    new_count: i64,
    gift_link: Option<&str>,
) -> String {
    let (direction, verb) = if new_count > old_count {
        ("📈", "increased")
    } else {
        ("📉", "decreased")
    };

    let mut message = String::from("🎁 *Gift count changed*\n\n");
    message.push_str(&format!("🎯 *Subscription:* {}\n", subscription.gift_name));
    if let Some(ref model) = subscription.model {
        message.push_str(&format!("🤖 *Model:* {}\n", model));
    }
    if let Some(ref background) = subscription.background {
        message.push_str(&format!("🎨 *Background:* {}\n", background));
    }
    if let Some(ref pattern) = subscription.pattern {
        message.push_str(&format!("🔍 *Pattern:* {}\n", pattern));
    }

    message.push_str(&format!(
        "\n{} Count {}: *{}* → *{}*\n",
        direction, verb, old_count, new_count
    ));
    message.push_str(&format!(
        "📊 Difference: *{}*\n",
        (new_count - old_count).abs()
    ));

    if let Some(link) = gift_link {
        message.push_str(&format!("\n🎁 [View latest gift]({})", link));
    }
    message.push_str(&format!(
        "\n🔗 [View all on peek.tg]({})",
        search_url(&SearchCriteria::from(subscription))
    ));

    message
}

/// Markdown stats summary for live status displays.
pub fn format_stats(stats: &MonitoringStats) -> String {
    let status = if stats.is_running {
        "🟢 Running"
    } else {
        "🔴 Stopped"
    };
    let last_check = stats
        .last_check
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "Never".to_string());

    format!(
        "📊 *Monitoring statistics*\n\n\
         🔄 *Status:* {}\n\
         📈 *Total checks:* {}\n\
         ✅ *Successful:* {}\n\
         ❌ *Failed:* {}\n\
         🎯 *Changes detected:* {}\n\
         ⏰ *Last check:* {}\n\n\
         📊 *Success rate:* {}%",
        status,
        stats.total_checks,
        stats.successful_checks,
        stats.failed_checks,
        stats.total_changes,
        last_check,
        stats.success_rate()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn subscription() -> Subscription {
        Subscription {
            id: 1,
            user_id: 42,
            gift_name: "Plush Pepe".to_string(),
            model: Some("Golden".to_string()),
            background: None,
            pattern: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn search_url_encodes_present_filters_only() {
        let criteria = SearchCriteria {
            gift_name: "Plush Pepe".to_string(),
            model: Some("Golden".to_string()),
            background: None,
            pattern: None,
        };
        let url = search_url(&criteria);
        assert!(url.starts_with("https://peek.tg/gifts?"));
        assert!(url.contains("gift=Plush+Pepe"));
        assert!(url.contains("model=Golden"));
        assert!(!url.contains("background"));
    }

    #[test]
    fn change_notification_shows_direction_and_difference() {
        let message = format_change_notification(&subscription(), 5, 9, None);
        assert!(message.contains("📈 Count increased: *5* → *9*"));
        assert!(message.contains("Difference: *4*"));
        assert!(message.contains("*Model:* Golden"));
        assert!(!message.contains("View latest gift"));
        assert!(message.contains("View all on peek.tg"));

        let message = format_change_notification(&subscription(), 9, 5, None);
        assert!(message.contains("📉 Count decreased: *9* → *5*"));
    }

    #[test]
    fn change_notification_includes_gift_link_when_present() {
        let message =
            format_change_notification(&subscription(), 5, 9, Some("https://t.me/nft/Pepe-1"));
        assert!(message.contains("[View latest gift](https://t.me/nft/Pepe-1)"));
    }

    #[test]
    fn stats_format_reports_status_and_rate() {
        let stats = MonitoringStats {
            total_checks: 4,
            successful_checks: 3,
            failed_checks: 1,
            total_changes: 2,
            last_check: None,
            is_running: true,
        };
        let message = format_stats(&stats);
        assert!(message.contains("🟢 Running"));
        assert!(message.contains("*Total checks:* 4"));
        assert!(message.contains("*Last check:* Never"));
        assert!(message.contains("*Success rate:* 75%"));
    }
}
