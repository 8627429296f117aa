//! Channel switching on top of link sessions

use tracing::{info, warn};

use super::{LinkContext, LinkSession, SessionSummary};
use crate::types::ChannelSelector;
use crate::{LinkError, Result};

/// Owns the channel selection and the session running on it
pub struct LinkController {
    ctx: LinkContext,
    selector: ChannelSelector,
    session: Option<LinkSession>,
}

impl LinkController {
    pub fn new(ctx: LinkContext) -> Result<Self> {
        let selector = ChannelSelector::with_index(
            ctx.config.channels.clone(),
            ctx.config.initial_channel_index,
        )?;
        Ok(Self { ctx, selector, session: None })
    }

    pub fn context(&self) -> &LinkContext {
        &self.ctx
    }

    pub fn selector(&self) -> &ChannelSelector {
        &self.selector
    }

    pub fn current_channel(&self) -> u16 {
        self.selector.current()
    }

    pub fn is_running(&self) -> bool {
        self.session.as_ref().is_some_and(|session| !session.is_finished())
    }

    /// Start capturing on the selected channel, replacing any running session
    pub async fn start(&mut self) -> Result<u16> {
        self.restart().await?;
        Ok(self.selector.current())
    }

    /// Stop the running session and wait for it to exit
    pub async fn stop(&mut self) -> Result<Option<SessionSummary>> {
        let Some(session) = self.session.take() else {
            return Ok(None);
        };
        session.stop();
        let summary = session.wait().await?;
        Ok(Some(summary))
    }

    pub async fn next_channel(&mut self) -> Result<u16> {
        let channel = self.selector.next();
        info!(channel, index = self.selector.index(), "Switching to next channel");
        self.restart().await?;
        Ok(channel)
    }

    pub async fn previous_channel(&mut self) -> Result<u16> {
        let channel = self.selector.previous();
        info!(channel, index = self.selector.index(), "Switching to previous channel");
        self.restart().await?;
        Ok(channel)
    }

    pub async fn select_channel(&mut self, index: usize) -> Result<u16> {
        let channel = self.selector.select(index).ok_or_else(|| {
            LinkError::config(format!(
                "channel index {} out of range for {} channels",
                index,
                self.selector.len()
            ))
        })?;
        info!(channel, index, "Switching channel");
        self.restart().await?;
        Ok(channel)
    }

    /// Stop, join, then start on the current selection.
    ///
    /// The decoder keeps running across the switch.
    async fn restart(&mut self) -> Result<()> {
        match self.stop().await {
            Ok(Some(summary)) => info!(
                radio_channel = summary.radio_channel,
                frames = summary.frames_seen,
                "Previous session finished"
            ),
            Ok(None) => {}
            Err(e) => warn!("Previous session ended with error: {}", e),
        }
        let session = LinkSession::start(&self.ctx, self.selector.current()).await?;
        self.session = Some(session);
        Ok(())
    }
}
