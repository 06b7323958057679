//! Conversions between wire types and application records.

use slopfeed_api_types::{ExperimentStatsView, FeedPost, ai_post_id, flag_value};

use crate::application::feed::FeedEntry;
use crate::application::interactions::PostReference;
use crate::domain::entities::{ExperimentStatsRecord, PostRecord};

pub fn feed_post(entry: FeedEntry) -> FeedPost {
    match entry {
        FeedEntry::Post(post) => stored_post(post, None),
        FeedEntry::Humor(post) => {
            let humor_id = post.id;
            stored_post(post, Some(humor_id))
        }
        FeedEntry::Ai(post) => FeedPost {
            id: Some(post.archive_id),
            post_id: Some(ai_post_id(post.archive_id)),
            title: post.title,
            self_text: post.self_text,
            subreddit: post.subreddit,
            over_18: flag_value(false),
            link_flair_text: None,
            is_ai: true,
            humor_post_id: None,
        },
    }
}

fn stored_post(post: PostRecord, humor_post_id: Option<i64>) -> FeedPost {
    FeedPost {
        id: Some(post.id),
        post_id: Some(post.post_id.unwrap_or_else(|| post.id.to_string())),
        title: post.title,
        self_text: post.self_text,
        subreddit: post.subreddit,
        over_18: flag_value(post.over_18),
        link_flair_text: post.link_flair_text,
        is_ai: post.is_ai,
        humor_post_id,
    }
}

pub fn post_reference(post: &FeedPost) -> PostReference {
    PostReference {
        ai_archive_id: post.ai_archive_id(),
        humor_post_id: post.humor_post_id,
        title: post.title.clone(),
        self_text: post.self_text.clone(),
        subreddit: post.subreddit.clone(),
        over_18: post.is_over_18(),
        link_flair_text: post.link_flair_text.clone(),
        is_ai: post.is_ai,
    }
}

pub fn stats_view(record: ExperimentStatsRecord) -> ExperimentStatsView {
    let counters = record.counters;
    let rates = record.rates;
    ExperimentStatsView {
        experiment: record.experiment,
        ai_post_count: counters.ai_post_count,
        real_post_count: counters.real_post_count,
        liked_ai_post_count: counters.liked_ai_post_count,
        liked_real_post_count: counters.liked_real_post_count,
        ai_marked_as_ai_count: counters.ai_marked_as_ai_count,
        real_marked_as_ai_count: counters.real_marked_as_ai_count,
        ai_dislike_count: counters.ai_dislike_count,
        real_dislike_count: counters.real_dislike_count,
        ai_like_rate: rates.ai_like_rate,
        real_like_rate: rates.real_like_rate,
        ai_marked_as_ai_rate: rates.ai_marked_as_ai_rate,
        real_marked_as_ai_rate: rates.real_marked_as_ai_rate,
        ai_dislike_rate: rates.ai_dislike_rate,
        real_dislike_rate: rates.real_dislike_rate,
        aware_of_experiment: record.aware_of_experiment,
    }
}
