use crate::{
    error::{AppError, AppResult},
    models::{
        topic_poll, topic_poll_option, topic_poll_vote, TopicPoll, TopicPollModel,
        TopicPollOption, TopicPollOptionModel, TopicPollVote,
    },
};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use std::collections::{HashMap, HashSet};

pub const POLL_MAX_OPTIONS_PER_USER: i16 = 10;
pub const POLL_MIN_OPTIONS: usize = 2;

#[derive(Debug, Clone)]
pub struct PollInput {
    pub question: String,
    pub duration: Option<i32>,
    pub max_options: i16,
    pub user_changes: bool,
    pub options: Vec<String>,
}

/// Trimmed option texts, blank entries dropped.
fn clean_options(options: &[String]) -> Vec<String> {
    options
        .iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect()
}

pub fn validate_poll(input: &PollInput) -> AppResult<()> {
    let question = input.question.trim();
    if question.is_empty() || question.chars().count() > 255 {
        return Err(AppError::Validation(
            "Poll question must be between 1 and 255 characters".to_string(),
        ));
    }
    if input.duration.is_some_and(|d| d < 1) {
        return Err(AppError::Validation(
            "Poll duration must be at least one day".to_string(),
        ));
    }
    if !(1..=POLL_MAX_OPTIONS_PER_USER).contains(&input.max_options) {
        return Err(AppError::Validation(format!(
            "Max options per user must be between 1 and {}",
            POLL_MAX_OPTIONS_PER_USER
        )));
    }
    let options = clean_options(&input.options);
    if options.len() < POLL_MIN_OPTIONS {
        return Err(AppError::Validation(format!(
            "A poll needs at least {} options",
            POLL_MIN_OPTIONS
        )));
    }
    if options.iter().any(|o| o.chars().count() > 255) {
        return Err(AppError::Validation(
            "Poll options must be at most 255 characters".to_string(),
        ));
    }
    Ok(())
}

/// Checks a ballot against the poll it is cast in.
pub fn validate_vote(
    poll: &TopicPollModel,
    poll_option_ids: &HashSet<i32>,
    chosen: &[i32],
) -> AppResult<()> {
    let unique: HashSet<i32> = chosen.iter().copied().collect();
    if unique.is_empty() {
        return Err(AppError::Validation(
            "Select at least one option".to_string(),
        ));
    }
    if unique.len() != chosen.len() {
        return Err(AppError::Validation(
            "An option can only be chosen once".to_string(),
        ));
    }
    if unique.len() > poll.max_options as usize {
        return Err(AppError::Validation(format!(
            "You may select at most {} option(s)",
            poll.max_options
        )));
    }
    if !unique.is_subset(poll_option_ids) {
        return Err(AppError::Validation(
            "Selected options do not belong to this poll".to_string(),
        ));
    }
    Ok(())
}

/// Insert a poll and its options on the caller's connection.
pub async fn create_in<C: ConnectionTrait>(
    conn: &C,
    topic_id: i32,
    input: PollInput,
) -> AppResult<TopicPollModel> {
    validate_poll(&input)?;

    let now = chrono::Utc::now().naive_utc();
    let poll = topic_poll::ActiveModel {
        topic_id: Set(topic_id),
        question: Set(input.question.trim().to_string()),
        duration: Set(input.duration),
        max_options: Set(input.max_options),
        user_changes: Set(input.user_changes),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    let options = clean_options(&input.options)
        .into_iter()
        .map(|text| topic_poll_option::ActiveModel {
            poll_id: Set(poll.id),
            text: Set(text),
            ..Default::default()
        });
    TopicPollOption::insert_many(options).exec(conn).await?;

    Ok(poll)
}

#[derive(Debug, Clone)]
pub struct PollDetails {
    pub poll: TopicPollModel,
    pub options: Vec<(TopicPollOptionModel, i64)>,
}

impl PollDetails {
    pub fn total_votes(&self) -> i64 {
        self.options.iter().map(|(_, votes)| votes).sum()
    }
}

pub struct PollService {
    db: DatabaseConnection,
}

impl PollService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<TopicPollModel> {
        TopicPoll::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn get_for_topic(&self, topic_id: i32) -> AppResult<PollDetails> {
        let poll = TopicPoll::find()
            .filter(topic_poll::Column::TopicId.eq(topic_id))
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;
        self.details(poll).await
    }

    pub async fn details(&self, poll: TopicPollModel) -> AppResult<PollDetails> {
        let options = self.options(poll.id).await?;
        let option_ids: Vec<i32> = options.iter().map(|o| o.id).collect();

        let counts: HashMap<i32, i64> = TopicPollVote::find()
            .select_only()
            .column(topic_poll_vote::Column::PollOptionId)
            .column_as(Expr::col(topic_poll_vote::Column::Id).count(), "votes")
            .filter(topic_poll_vote::Column::PollOptionId.is_in(option_ids))
            .group_by(topic_poll_vote::Column::PollOptionId)
            .into_tuple::<(i32, i64)>()
            .all(&self.db)
            .await?
            .into_iter()
            .collect();

        let options = options
            .into_iter()
            .map(|o| {
                let votes = counts.get(&o.id).copied().unwrap_or(0);
                (o, votes)
            })
            .collect();

        Ok(PollDetails { poll, options })
    }

    /// False for anonymous visitors.
    pub async fn has_been_completed_by(&self, poll_id: i32, user_id: Option<i32>) -> AppResult<bool> {
        let Some(user_id) = user_id else {
            return Ok(false);
        };
        let option_ids = self.option_ids(poll_id).await?;
        let votes = TopicPollVote::find()
            .filter(topic_poll_vote::Column::VoterId.eq(user_id))
            .filter(topic_poll_vote::Column::PollOptionId.is_in(option_ids))
            .count(&self.db)
            .await?;
        Ok(votes > 0)
    }

    /// Replace the voter's ballot with `chosen`.
    pub async fn vote(&self, poll: &TopicPollModel, user_id: i32, chosen: &[i32]) -> AppResult<()> {
        let option_ids = self.option_ids(poll.id).await?;
        let valid: HashSet<i32> = option_ids.iter().copied().collect();
        validate_vote(poll, &valid, chosen)?;

        let now = chrono::Utc::now().naive_utc();
        let txn = self.db.begin().await?;

        TopicPollVote::delete_many()
            .filter(topic_poll_vote::Column::VoterId.eq(user_id))
            .filter(topic_poll_vote::Column::PollOptionId.is_in(option_ids))
            .exec(&txn)
            .await?;

        let ballot = chosen.iter().map(|option_id| topic_poll_vote::ActiveModel {
            poll_option_id: Set(*option_id),
            voter_id: Set(user_id),
            timestamp: Set(now),
            ..Default::default()
        });
        TopicPollVote::insert_many(ballot).exec(&txn).await?;

        txn.commit().await?;
        tracing::debug!(poll_id = poll.id, user_id, options = chosen.len(), "Poll vote recorded");
        Ok(())
    }

    async fn options(&self, poll_id: i32) -> AppResult<Vec<TopicPollOptionModel>> {
        Ok(TopicPollOption::find()
            .filter(topic_poll_option::Column::PollId.eq(poll_id))
            .order_by_asc(topic_poll_option::Column::Id)
            .all(&self.db)
            .await?)
    }

    async fn option_ids(&self, poll_id: i32) -> AppResult<Vec<i32>> {
        Ok(TopicPollOption::find()
            .select_only()
            .column(topic_poll_option::Column::Id)
            .filter(topic_poll_option::Column::PollId.eq(poll_id))
            .into_tuple()
            .all(&self.db)
            .await?)
    }
}
