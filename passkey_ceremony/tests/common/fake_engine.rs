//! A scripted stand-in for the WebAuthn verification engine.
//!
//! Challenges are random bytes. A "valid" client response simply echoes the
//! challenge in its payload; the engine checks the echo and, for
//! authentication, consults the credential repository the way a real engine
//! would.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use ring::rand::{SecureRandom, SystemRandom};
use serde_json::{Value, json};
use std::sync::Mutex;

use passkey_ceremony::{
    AuthenticationOutcome, CeremonyChallenge, CeremonyOptions, Challenge, ClientResponse,
    CredentialId, CredentialRepository, IssuedChallenge, PendingCeremony, RegistrationOutcome,
    UserEntity, UserHandle, VerificationEngine, VerificationError,
};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    StartRegistration {
        user: UserEntity,
        exclude: Vec<CredentialId>,
    },
    StartAuthentication {
        allow: Vec<CredentialId>,
    },
    FinishRegistration,
    FinishAuthentication,
}

/// Overrides the engine's next `finish_*` call.
#[derive(Debug, Clone)]
pub enum EngineScript {
    /// Fail with an internal engine error
    Fault(String),
    /// Report success for the presented credential without consulting the repository
    VerifyUnchecked { sign_count: u32 },
}

#[derive(Default)]
pub struct FakeEngine {
    calls: Mutex<Vec<EngineCall>>,
    script: Mutex<Option<EngineScript>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn script_next(&self, script: EngineScript) {
        *self.script.lock().unwrap() = Some(script);
    }

    fn take_script(&self) -> Option<EngineScript> {
        self.script.lock().unwrap().take()
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn new_challenge() -> Challenge {
        let mut bytes = vec![0u8; 32];
        SystemRandom::new().fill(&mut bytes).unwrap();
        Challenge::new(bytes)
    }

    fn check_challenge(ceremony: &PendingCeremony, payload: &Value) -> Result<(), VerificationError> {
        if let Some(reason) = payload.get("reject").and_then(Value::as_str) {
            return Err(VerificationError::Rejected(reason.to_string()));
        }
        match payload.get("challenge").and_then(Value::as_str) {
            Some(echoed) if echoed == ceremony.challenge.to_base64url() => Ok(()),
            _ => Err(VerificationError::Rejected("challenge mismatch".to_string())),
        }
    }

    fn sign_count(payload: &Value) -> u32 {
        payload
            .get("sign_count")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0)
    }
}

/// Challenge embedded in the options returned by `begin_*`.
pub fn challenge_of(started: &CeremonyChallenge) -> String {
    started.options["challenge"]
        .as_str()
        .expect("options carry a challenge")
        .to_string()
}

/// A registration response that the fake engine accepts.
pub fn registration_response(
    started: &CeremonyChallenge,
    credential_id: &[u8],
    sign_count: u32,
) -> ClientResponse {
    ClientResponse {
        credential_id: CredentialId::new(credential_id.to_vec()),
        user_handle: None,
        payload: json!({
            "challenge": challenge_of(started),
            "public_key": URL_SAFE_NO_PAD.encode(credential_id),
            "sign_count": sign_count,
            "aaguid": "fbfc3007-154e-4ecc-8c0b-6e020557d7bd",
        }),
    }
}

/// An assertion that the fake engine accepts, if the credential is registered
/// to `user_handle` (or, with no handle, to the ceremony's bound user).
pub fn authentication_response(
    started: &CeremonyChallenge,
    credential_id: &[u8],
    user_handle: Option<&UserHandle>,
    sign_count: u32,
) -> ClientResponse {
    ClientResponse {
        credential_id: CredentialId::new(credential_id.to_vec()),
        user_handle: user_handle.cloned(),
        payload: json!({
            "challenge": challenge_of(started),
            "sign_count": sign_count,
        }),
    }
}

#[async_trait]
impl VerificationEngine for FakeEngine {
    async fn start_registration(
        &self,
        user: &UserEntity,
        exclude_credentials: &[CredentialId],
        options: &CeremonyOptions,
    ) -> Result<IssuedChallenge, VerificationError> {
        self.record(EngineCall::StartRegistration {
            user: user.clone(),
            exclude: exclude_credentials.to_vec(),
        });

        let challenge = Self::new_challenge();
        let options = json!({
            "challenge": challenge.to_base64url(),
            "user": user,
            "excludeCredentials": exclude_credentials,
            "timeout": options.timeout_ms,
            "authenticatorSelection": {
                "authenticatorAttachment": options.authenticator_attachment,
                "residentKey": options.resident_key,
                "userVerification": options.user_verification,
            },
        });
        Ok(IssuedChallenge { challenge, options })
    }

    async fn start_authentication(
        &self,
        allow_credentials: &[CredentialId],
        options: &CeremonyOptions,
    ) -> Result<IssuedChallenge, VerificationError> {
        self.record(EngineCall::StartAuthentication {
            allow: allow_credentials.to_vec(),
        });

        let challenge = Self::new_challenge();
        let options = json!({
            "challenge": challenge.to_base64url(),
            "allowCredentials": allow_credentials,
            "timeout": options.timeout_ms,
            "userVerification": options.user_verification,
        });
        Ok(IssuedChallenge { challenge, options })
    }

    async fn finish_registration(
        &self,
        ceremony: &PendingCeremony,
        response: &ClientResponse,
        _repository: &CredentialRepository,
    ) -> Result<RegistrationOutcome, VerificationError> {
        self.record(EngineCall::FinishRegistration);
        if let Some(EngineScript::Fault(msg)) = self.take_script() {
            return Err(VerificationError::Engine(msg));
        }
        Self::check_challenge(ceremony, &response.payload)?;

        let public_key = response
            .payload
            .get("public_key")
            .and_then(Value::as_str)
            .and_then(|key| URL_SAFE_NO_PAD.decode(key).ok())
            .ok_or_else(|| VerificationError::Engine("missing public key".to_string()))?;

        Ok(RegistrationOutcome {
            credential_id: response.credential_id.clone(),
            public_key,
            sign_count: Self::sign_count(&response.payload),
            aaguid: response
                .payload
                .get("aaguid")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    async fn finish_authentication(
        &self,
        ceremony: &PendingCeremony,
        response: &ClientResponse,
        repository: &CredentialRepository,
    ) -> Result<AuthenticationOutcome, VerificationError> {
        self.record(EngineCall::FinishAuthentication);
        match self.take_script() {
            Some(EngineScript::Fault(msg)) => return Err(VerificationError::Engine(msg)),
            Some(EngineScript::VerifyUnchecked { sign_count }) => {
                return Ok(AuthenticationOutcome {
                    credential_id: response.credential_id.clone(),
                    sign_count,
                    success: true,
                });
            }
            None => {}
        }
        Self::check_challenge(ceremony, &response.payload)?;

        let user_handle = match (&response.user_handle, &ceremony.bound_username) {
            (Some(handle), _) => handle.clone(),
            (None, Some(username)) => repository
                .user_handle_for(username)
                .await
                .map_err(|e| VerificationError::Engine(e.to_string()))?
                .ok_or_else(|| VerificationError::Rejected("unknown user".to_string()))?,
            (None, None) => {
                return Err(VerificationError::Rejected(
                    "discoverable response without user handle".to_string(),
                ));
            }
        };

        let registered = repository
            .registered_credential(&response.credential_id, &user_handle)
            .await
            .map_err(|e| VerificationError::Engine(e.to_string()))?
            .ok_or_else(|| {
                VerificationError::Rejected("credential not registered to user".to_string())
            })?;

        Ok(AuthenticationOutcome {
            credential_id: registered.credential_id,
            sign_count: Self::sign_count(&response.payload),
            success: true,
        })
    }
}
