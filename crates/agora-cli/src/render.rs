//! Plain-text rendering of Gateway records.

use agora_core::{Principal, graph::SocialStats, profile::UserProfile};
use agora_gateway::views::{FeedItem, ProfilePage};
use chrono::{DateTime, Utc};

fn when(at: &DateTime<Utc>) -> String { relative(at, Utc::now()) }

/// Age of `at` as seen at `now`. Anything older than a week, or in the
/// future, is shown as a date.
fn relative(at: &DateTime<Utc>, now: DateTime<Utc>) -> String {
  let age = now.signed_duration_since(*at);
  match age.num_seconds() {
    0..60 => "just now".to_string(),
    60..3_600 => format!("{}m ago", age.num_minutes()),
    3_600..86_400 => format!("{}h ago", age.num_hours()),
    86_400..604_800 => format!("{}d ago", age.num_days()),
    _ => at.format("%Y-%m-%d").to_string(),
  }
}

pub fn profile_line(profile: &UserProfile) {
  let badge = if profile.is_verified { " ✓" } else { "" };
  println!("  @{}{badge}  {}", profile.username, profile.display_name);
}

pub fn profile(profile: &UserProfile) {
  let badge = if profile.is_verified { " ✓" } else { "" };
  println!("{}{badge} (@{})", profile.display_name, profile.username);
  if !profile.bio.is_empty() {
    println!("{}", profile.bio);
  }
  println!("Joined {}", when(&profile.created_at));
}

pub fn stats(stats: &SocialStats) {
  println!(
    "{} followers · {} following",
    stats.followers_count, stats.following_count
  );
}

pub fn profile_page(page: &ProfilePage) {
  profile(&page.profile);
  stats(&page.stats);
  match page.is_following {
    Some(true) => println!("You follow @{}", page.profile.username),
    Some(false) => println!("You don't follow @{}", page.profile.username),
    None => {}
  }
  println!();
  if page.posts.is_empty() {
    println!("No posts yet.");
  }
  for post in &page.posts {
    println!("#{} · {}", post.id, when(&post.created_at));
    println!("  {}", post.content);
    println!("  ♥ {}", post.displayed_like_count());
  }
}

pub fn feed_item(item: &FeedItem, me: &Principal) {
  let post = &item.post;
  let mine = if post.is_authored_by(me) { " (you)" } else { "" };
  println!(
    "#{} {}{mine} · {}",
    post.id,
    item.author.handle(),
    when(&post.created_at)
  );
  println!("  {}", post.content);
  for url in &post.media_urls {
    println!("  [{url}]");
  }
  println!("  ♥ {}", post.displayed_like_count());
  println!();
}
