//! User-agent synthesis
//!
//! Default `User-Agent` values for outbound clients are drawn from a small
//! pool of current browser/OS combinations.

use rand::rngs::OsRng;
use rand::Rng;

const CHROME_VERSIONS: &[&str] = &["120.0.0", "121.0.0", "122.0.0"];
const FIREFOX_VERSIONS: &[&str] = &["122.0", "123.0", "124.0"];
const SAFARI_VERSIONS: &[&str] = &["17.2", "17.1", "16.6"];
const OS_VERSIONS: &[&str] = &[
    "Windows NT 10.0; Win64; x64",
    "Macintosh; Intel Mac OS X 10_15_7",
    "Macintosh; Intel Mac OS X 11_6_0",
    "X11; Linux x86_64",
    "X11; Ubuntu; Linux x86_64",
];

fn pick<'a>(choices: &[&'a str]) -> &'a str {
    choices[OsRng.gen_range(0..choices.len())]
}

/// Build a randomized browser user-agent string.
pub fn random_user_agent() -> String {
    match OsRng.gen_range(0..3u8) {
        0 => format!(
            "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{} Safari/537.36",
            pick(OS_VERSIONS),
            pick(CHROME_VERSIONS)
        ),
        1 => {
            let version = pick(FIREFOX_VERSIONS);
            format!(
                "Mozilla/5.0 ({}; rv:{version}) Gecko/20100101 Firefox/{version}",
                pick(OS_VERSIONS)
            )
        }
        _ => format!(
            "Mozilla/5.0 ({}) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{} Safari/605.1.15",
            pick(OS_VERSIONS),
            pick(SAFARI_VERSIONS)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_looks_like_a_browser() {
        for _ in 0..20 {
            let ua = random_user_agent();
            assert!(ua.starts_with("Mozilla/5.0 ("), "unexpected UA: {ua}");
            assert!(
                ua.contains("Chrome/") || ua.contains("Firefox/") || ua.contains("Version/"),
                "unexpected UA: {ua}"
            );
        }
    }

    #[test]
    fn test_user_agent_pool_varies() {
        let agents: std::collections::HashSet<String> =
            (0..50).map(|_| random_user_agent()).collect();
        assert!(agents.len() > 1);
    }
}
