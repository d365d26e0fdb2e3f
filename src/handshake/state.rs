use std::fmt;

use crate::error::HarnessError;

/// The server's `nextStep` discriminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    RequestOtp,
    EnterPassword,
    /// Anything else, including an absent field. The sub-flow is already
    /// satisfied. Unrecognised values are kept for diagnostics.
    Done(Option<String>),
}

impl NextStep {
    pub fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some("requestOtp") => NextStep::RequestOtp,
            Some("enterPassword") => NextStep::EnterPassword,
            other => NextStep::Done(other.map(str::to_string)),
        }
    }

    pub fn as_wire(&self) -> Option<&str> {
        match self {
            NextStep::RequestOtp => Some("requestOtp"),
            NextStep::EnterPassword => Some("enterPassword"),
            NextStep::Done(value) => value.as_deref(),
        }
    }
}

/// Where the authentication flow stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Started,
    RequiresNextStepDecision,
    RequiresOtp,
    RequiresPassword,
    Authenticated,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthState::Started => "started",
            AuthState::RequiresNextStepDecision => "requires next-step decision",
            AuthState::RequiresOtp => "requires OTP",
            AuthState::RequiresPassword => "requires password",
            AuthState::Authenticated => "authenticated",
        };
        f.write_str(name)
    }
}

/// A server response, reduced to what moves the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// `auth/start` returned a token, server key and first challenge.
    StartAccepted,
    /// `auth/nextstep` answered.
    NextStep(NextStep),
    /// `otp/confirm` succeeded and named what comes after it.
    OtpConfirmed(NextStep),
    /// `enterpassword` succeeded and issued the final token.
    PasswordAccepted,
}

impl AuthState {
    pub fn is_terminal(self) -> bool {
        self == AuthState::Authenticated
    }

    /// Apply one event. Any pairing not listed below is rejected.
    pub fn advance(self, event: AuthEvent) -> Result<AuthState, HarnessError> {
        use AuthEvent as E;
        use AuthState as S;

        let next = match (self, &event) {
            (S::Started, E::StartAccepted) => S::RequiresNextStepDecision,

            (S::RequiresNextStepDecision, E::NextStep(step)) => match step {
                NextStep::RequestOtp => S::RequiresOtp,
                NextStep::EnterPassword => S::RequiresPassword,
                NextStep::Done(value) => done(value.as_deref()),
            },

            (S::RequiresOtp, E::OtpConfirmed(step)) => match step {
                NextStep::EnterPassword => S::RequiresPassword,
                NextStep::Done(value) => done(value.as_deref()),
                NextStep::RequestOtp => return Err(self.unexpected(&event)),
            },

            (S::RequiresPassword, E::PasswordAccepted) => S::Authenticated,

            _ => return Err(self.unexpected(&event)),
        };
        Ok(next)
    }

    fn unexpected(self, event: &AuthEvent) -> HarnessError {
        HarnessError::UnexpectedTransition {
            state: self,
            event: event.clone(),
        }
    }
}

fn done(value: Option<&str>) -> AuthState {
    match value {
        None => tracing::info!("no nextStep in response, sub-flow already satisfied"),
        Some(other) => tracing::warn!(next_step = other, "unrecognised nextStep, treating as done"),
    }
    AuthState::Authenticated
}
