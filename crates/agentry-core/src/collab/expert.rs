//! Expert panels
//!
//! Experts are briefed independently and a moderator merges what they said,
//! either once ([`ExpertTeam::collaborate`]) or after several rounds of
//! debate ([`ExpertTeam::debate`]). An expert whose model call fails is
//! recorded with an error and never stops the others.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agents::{AgentInstance, HistoryEntry, MODERATOR_PROMPT, TaskOutcome, TaskRunner};
use crate::chain::{StepData, StepReporter};
use crate::text::extract_json_object;
use crate::{Error, Result};

/// Topic used when nobody proposes the next one
pub const CONTINUE_TOPIC: &str = "continue discussing";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertOpinion {
    pub expert: String,
    pub expertise: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExpertOpinion {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    fn line(&self) -> String {
        match &self.error {
            Some(error) => format!("- {} ({}): unavailable ({})", self.expert, self.expertise, error),
            None => format!("- {} ({}): {}", self.expert, self.expertise, self.content),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationResult {
    pub task: String,
    pub opinions: Vec<ExpertOpinion>,
    pub synthesis: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateRound {
    pub round: usize,
    pub topic: String,
    pub opinions: Vec<ExpertOpinion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateResult {
    pub topic: String,
    pub debate_history: Vec<DebateRound>,
    pub synthesis: String,
}

/// What `run_task` does with the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelMode {
    Collaborate,
    Debate { rounds: usize },
}

pub struct ExpertTeam {
    name: String,
    experts: Vec<AgentInstance>,
    moderator: Option<AgentInstance>,
    parallel: bool,
    mode: PanelMode,
    reporter: Option<Arc<dyn StepReporter>>,
}

impl ExpertTeam {
    pub fn new(name: impl Into<String>, experts: Vec<AgentInstance>) -> Self {
        Self {
            name: name.into(),
            experts,
            moderator: None,
            parallel: true,
            mode: PanelMode::Collaborate,
            reporter: None,
        }
    }

    pub fn with_moderator(mut self, moderator: AgentInstance) -> Self {
        self.moderator = Some(moderator);
        self
    }

    /// Brief experts concurrently (default) or one after another
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_mode(mut self, mode: PanelMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn set_reporter(&mut self, reporter: Option<Arc<dyn StepReporter>>) {
        self.reporter = reporter;
    }

    pub fn experts(&self) -> &[AgentInstance] {
        &self.experts
    }

    pub fn moderator_name(&self) -> Option<&str> {
        self.moderator.as_ref().map(|m| m.name())
    }

    /// The moderator, created with a neutral prompt on first use
    fn moderator(&mut self) -> Result<&mut AgentInstance> {
        let moderator = match self.moderator.take() {
            Some(moderator) => moderator,
            None => {
                let first = self.experts.first().ok_or_else(|| {
                    Error::InvalidArgument(format!("expert team '{}' has no experts", self.name))
                })?;
                debug!(team = %self.name, "Creating default moderator");
                AgentInstance::new(
                    "moderator",
                    "moderator",
                    first.model().clone(),
                    first.settings().clone(),
                )
                .with_system_prompt(MODERATOR_PROMPT)
            }
        };
        Ok(self.moderator.insert(moderator))
    }

    async fn report(&self, step: StepData) -> Result<()> {
        match &self.reporter {
            Some(reporter) => reporter.report_step(step).await,
            None => Ok(()),
        }
    }

    /// One prompt per expert, answers in expert order
    async fn gather(&mut self, prompts: Vec<String>) -> Vec<ExpertOpinion> {
        if self.parallel {
            join_all(
                self.experts
                    .iter_mut()
                    .zip(prompts)
                    .map(|(expert, prompt)| consult(expert, prompt)),
            )
            .await
        } else {
            let mut opinions = Vec::with_capacity(self.experts.len());
            for (expert, prompt) in self.experts.iter_mut().zip(prompts) {
                opinions.push(consult(expert, prompt).await);
            }
            opinions
        }
    }

    /// Independent opinions from every expert, merged by the moderator
    pub async fn collaborate(&mut self, task: &str) -> Result<CollaborationResult> {
        if self.experts.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "expert team '{}' has no experts",
                self.name
            )));
        }
        info!(team = %self.name, experts = self.experts.len(), parallel = self.parallel, "Consulting experts");

        let prompts = self
            .experts
            .iter()
            .map(|e| {
                format!(
                    "Task: {}\n\nAs an expert in {}, give your independent opinion.",
                    task,
                    e.expertise()
                )
            })
            .collect();
        let opinions = self.gather(prompts).await;
        for opinion in &opinions {
            self.report(
                StepData::new(format!("Opinion from {}", opinion.expert))
                    .result(serde_json::to_value(opinion)?),
            )
            .await?;
        }

        let prompt = format!(
            "Task: {}\n\nExpert opinions:\n{}\n\nSynthesise these opinions into one balanced answer.",
            task,
            opinions_block(&opinions)
        );
        let synthesis = self.moderator()?.ask(prompt).await?;
        self.report(StepData::new("Synthesis").result(synthesis.clone()))
            .await?;

        Ok(CollaborationResult {
            task: task.to_string(),
            opinions,
            synthesis,
        })
    }

    /// `rounds` rounds of debate followed by a moderator synthesis
    ///
    /// Every round each expert sees the full transcript of earlier rounds.
    /// Between rounds the moderator, when present, summarises and proposes
    /// the next focus; otherwise the focus becomes [`CONTINUE_TOPIC`].
    pub async fn debate(&mut self, topic: &str, rounds: usize) -> Result<DebateResult> {
        if self.experts.len() < 2 {
            return Err(Error::InvalidArgument(format!(
                "a debate needs at least two experts, team '{}' has {}",
                self.name,
                self.experts.len()
            )));
        }
        let rounds = rounds.max(1);
        info!(team = %self.name, rounds, "Starting debate");

        let mut history: Vec<DebateRound> = Vec::with_capacity(rounds);
        let mut focus = topic.to_string();
        for round in 1..=rounds {
            let transcript = transcript(&history);
            let prompts = self
                .experts
                .iter()
                .map(|e| {
                    let mut prompt = format!(
                        "Debate topic: {}\nRound {} of {}. Current focus: {}\n",
                        topic, round, rounds, focus
                    );
                    if !transcript.is_empty() {
                        prompt.push_str(&format!("\nTranscript so far:\n{}", transcript));
                    }
                    prompt.push_str(&format!(
                        "\nAs an expert in {}, give your contribution to this round.",
                        e.expertise()
                    ));
                    prompt
                })
                .collect();
            let opinions = self.gather(prompts).await;

            let mut summary = None;
            let mut next = focus.clone();
            if round < rounds {
                next = CONTINUE_TOPIC.to_string();
                if let Some(moderator) = self.moderator.as_mut() {
                    let reply = moderator
                        .ask(format!(
                            "Debate topic: {}\nRound {} contributions:\n{}\n\nSummarise the round and \
                             propose the focus of the next round. Reply with a JSON object \
                             {{\"summary\": \"...\", \"next_topic\": \"...\"}}.",
                            topic,
                            round,
                            opinions_block(&opinions)
                        ))
                        .await?;
                    let (text, proposed) = parse_moderation(&reply);
                    summary = Some(text);
                    if let Some(proposed) = proposed {
                        next = proposed;
                    }
                }
            }

            let entry = DebateRound {
                round,
                topic: focus,
                opinions,
                summary,
            };
            self.report(
                StepData::new(format!("Debate round {}", round)).result(serde_json::to_value(&entry)?),
            )
            .await?;
            history.push(entry);
            focus = next;
        }

        let prompt = format!(
            "Debate topic: {}\n\nFull transcript:\n{}\nGive the final synthesis of the debate.",
            topic,
            transcript(&history)
        );
        let synthesis = self.moderator()?.ask(prompt).await?;
        self.report(StepData::new("Synthesis").result(synthesis.clone()))
            .await?;

        Ok(DebateResult {
            topic: topic.to_string(),
            debate_history: history,
            synthesis,
        })
    }
}

async fn consult(expert: &mut AgentInstance, prompt: String) -> ExpertOpinion {
    let expertise = expert.expertise();
    let (content, error) = match expert.ask(prompt).await {
        Ok(content) => (content, None),
        Err(e) => {
            warn!(expert = %expert.name(), error = %e, "Expert failed to answer");
            (String::new(), Some(e.to_string()))
        }
    };
    ExpertOpinion {
        expert: expert.name().to_string(),
        expertise,
        content,
        error,
    }
}

fn opinions_block(opinions: &[ExpertOpinion]) -> String {
    opinions
        .iter()
        .map(ExpertOpinion::line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn transcript(history: &[DebateRound]) -> String {
    let mut text = String::new();
    for round in history {
        text.push_str(&format!("Round {} ({}):\n", round.round, round.topic));
        text.push_str(&opinions_block(&round.opinions));
        text.push('\n');
        if let Some(summary) = &round.summary {
            text.push_str(&format!("Moderator: {}\n", summary));
        }
    }
    text
}

/// Summary text and proposed next topic from a moderator reply
fn parse_moderation(reply: &str) -> (String, Option<String>) {
    let Some(value) = extract_json_object(reply) else {
        return (reply.trim().to_string(), None);
    };
    let field = |key: &str| {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };
    (
        field("summary").unwrap_or_else(|| reply.trim().to_string()),
        field("next_topic"),
    )
}

#[async_trait]
impl TaskRunner for ExpertTeam {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_task(&mut self, task: &str, _tools: Option<&[String]>) -> Result<TaskOutcome> {
        match self.mode {
            PanelMode::Collaborate => {
                let result = self.collaborate(task).await?;
                let mut history: Vec<HistoryEntry> = result
                    .opinions
                    .iter()
                    .map(|o| {
                        HistoryEntry::new(&o.expert, o.error.as_deref().unwrap_or(&o.content))
                    })
                    .collect();
                history.push(HistoryEntry::new("moderator", &result.synthesis));
                Ok(TaskOutcome::new(result.synthesis.clone())
                    .with_history(history)
                    .with_metadata("mode", "experts")
                    .with_metadata("opinions", serde_json::to_value(&result.opinions)?))
            }
            PanelMode::Debate { rounds } => {
                let result = self.debate(task, rounds).await?;
                let mut history = Vec::new();
                for round in &result.debate_history {
                    for o in &round.opinions {
                        history.push(HistoryEntry::new(
                            &o.expert,
                            o.error.as_deref().unwrap_or(&o.content),
                        ));
                    }
                    if let Some(summary) = &round.summary {
                        history.push(HistoryEntry::new("moderator", summary));
                    }
                }
                history.push(HistoryEntry::new("moderator", &result.synthesis));
                Ok(TaskOutcome::new(result.synthesis.clone())
                    .with_history(history)
                    .with_metadata("mode", "debate")
                    .with_metadata("debate_history", serde_json::to_value(&result.debate_history)?))
            }
        }
    }
}
