use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{fields, Browser, Secrets, StepDriver};
use crate::config::{mask_card_number, ManualCard};
use crate::error::HarnessError;
use crate::session::SessionKey;
use crate::transport::{Method, StepResponse};

// ── Card list ──────────────────────────────────────────────────────────────

/// Body of `GET /cards/v3`. Fields the harness does not use are kept as-is.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CardAccounts {
    #[serde(default)]
    pub card_accounts: Vec<CardAccount>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CardAccount {
    #[serde(default)]
    pub contract_id: Option<Value>,
    #[serde(default)]
    pub cards: Vec<Card>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    /// Numeric or string, depending on the API version.
    pub id: Value,
    #[serde(default)]
    pub card_name: Option<String>,
    #[serde(default)]
    pub card_number: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Card {
    pub fn id_string(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl CardAccount {
    /// The card payments are made with: the first card on the account.
    pub fn primary_card(&self) -> Option<&Card> {
        self.cards.first()
    }
}

/// The account owning a card with this exact `cardName`.
pub fn find_card_by_name<'c>(accounts: &'c CardAccounts, name: &str) -> Option<&'c CardAccount> {
    accounts
        .card_accounts
        .iter()
        .find(|account| account.cards.iter().any(|c| c.card_name.as_deref() == Some(name)))
}

// ── Payment inputs ─────────────────────────────────────────────────────────

/// Who pays a card-to-card transfer.
#[derive(Debug, Clone)]
pub enum Payer {
    /// One of the customer's own cards, by full card number.
    OwnCard(String),
    /// A card entered by hand; its CVV and expiry travel in the envelope.
    Manual(ManualCard),
}

#[derive(Debug, Clone)]
pub struct TopUp {
    pub phone_number: String,
    pub amount: String,
}

#[derive(Debug, Clone)]
pub struct Transfer {
    pub payer: Payer,
    pub recipient_card_number: String,
    pub amount: String,
}

/// What a confirmed payment returned.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub amount: String,
    pub confirmation: Value,
    /// 3-D Secure page handed to the browser, if the bank asked for one.
    pub redirect_url: Option<String>,
}

// ── Payments ───────────────────────────────────────────────────────────────

/// Card and payment workflows for an authenticated session.
pub struct Payments<'d, 'a> {
    driver: &'d StepDriver<'a>,
    secrets: &'d dyn Secrets,
    browser: &'d dyn Browser,
}

impl<'d, 'a> Payments<'d, 'a> {
    pub fn new(
        driver: &'d StepDriver<'a>,
        secrets: &'d dyn Secrets,
        browser: &'d dyn Browser,
    ) -> Self {
        Self {
            driver,
            secrets,
            browser,
        }
    }

    /// `GET /cards/v3?forceCacheReload=true`, stored as `cardAccounts`.
    pub fn fetch_cards(&self) -> Result<CardAccounts, HarnessError> {
        let response = self
            .driver
            .plain("cards", Method::Get, "/cards/v3?forceCacheReload=true")?;
        let accounts: CardAccounts = serde_json::from_value(response.body.clone())
            .map_err(|source| HarnessError::Decode {
                step: "cards",
                source,
            })?;
        self.driver.session().put(SessionKey::CardAccounts, &response.body)?;
        Ok(accounts)
    }

    /// Find the account owning card `name` in the stored card list and store
    /// it as `payerCard`.
    pub fn select_payer_card(&self, name: &str) -> Result<CardAccount, HarnessError> {
        let session = self.driver.session();
        let accounts: CardAccounts = session.require(SessionKey::CardAccounts)?;
        let account = find_card_by_name(&accounts, name)
            .cloned()
            .ok_or_else(|| HarnessError::CardNotFound(name.to_string()))?;
        session.put(SessionKey::PayerCard, &account)?;
        tracing::info!(card = name, "payer card selected");
        Ok(account)
    }

    fn payer_card(&self) -> Result<Card, HarnessError> {
        let account: CardAccount = self.driver.session().require(SessionKey::PayerCard)?;
        account
            .primary_card()
            .cloned()
            .ok_or_else(|| HarnessError::CardNotFound("payerCard (account has no cards)".to_string()))
    }

    /// `GET <markup>`: opens a payment session. Stores its challenge and
    /// `sessionGuid`.
    fn open_payment(&self, step: &'static str, path: &str) -> Result<String, HarnessError> {
        let response = self.driver.plain(step, Method::Get, path)?;
        let guid = response.require_str(step, "sessionGuid")?.to_string();
        self.driver
            .absorb_challenge(&response, vec![(SessionKey::SessionGuid, Value::String(guid.clone()))])?;
        Ok(guid)
    }

    fn password_fields(&self) -> Result<Map<String, Value>, HarnessError> {
        let password = self.secrets.password()?;
        Ok(fields([("password", Value::String(password.to_string()))]))
    }

    /// Mobile top-up paid from `payerCard`.
    pub fn mobile_top_up(&self, top_up: &TopUp) -> Result<PaymentOutcome, HarnessError> {
        let payer = self.payer_card()?;

        let guid = self.open_payment("topup/markup", "/payments/service/mobilemulti/markup")?;

        let controls = json!([
            { "Name": "PayeeId", "Value": format!("card:{}", payer.id_string()) },
            { "Name": "PhoneNumber", "Value": top_up.phone_number },
            { "Name": "Amount", "Value": top_up.amount },
        ]);
        self.driver.protected(
            "topup/setinput",
            "/payments/v2/service/MobileMulti/setinput",
            fields([("controls", controls)]),
            fields([("sessionGuid", Value::String(guid.clone()))]),
        )?;

        self.driver.plain(
            "topup/commission",
            Method::Get,
            "/payments/v2/service/MobileMulti/commission",
        )?;

        let confirm = self.driver.protected(
            "topup/confirm",
            "/payments/service/MobileMulti/confirm",
            self.password_fields()?,
            fields([("sessionGuid", Value::String(guid))]),
        )?;
        tracing::info!(amount = %top_up.amount, "mobile top-up confirmed");

        Ok(PaymentOutcome {
            amount: top_up.amount.clone(),
            confirmation: confirm.body,
            redirect_url: None,
        })
    }

    /// Save the last top-up as a template called `name`.
    pub fn save_top_up_template(&self, name: &str) -> Result<StepResponse, HarnessError> {
        self.driver.protected(
            "topup/template",
            "/payments/service/MobileMulti/saveAsTemplate",
            Map::new(),
            fields([("name", Value::String(name.to_string()))]),
        )
    }

    /// Card-to-card transfer.
    ///
    /// If the confirmation carries a `redirectUrl` (3-D Secure), it is
    /// handed to the browser. A browser failure is logged, not returned.
    pub fn card_transfer(&self, transfer: &Transfer) -> Result<PaymentOutcome, HarnessError> {
        let guid = self.open_payment("p2p/markup", "/payments/p2p/markup")?;

        let (extra, payer_number) = match &transfer.payer {
            Payer::OwnCard(number) => (Map::new(), number.as_str()),
            Payer::Manual(card) => (
                fields([
                    ("cvv", Value::String(card.cvv.clone())),
                    ("expiryDate", Value::String(card.expiry_date.clone())),
                ]),
                card.card_number.as_str(),
            ),
        };
        tracing::info!(
            payer = %mask_card_number(payer_number),
            recipient = %mask_card_number(&transfer.recipient_card_number),
            amount = %transfer.amount,
            "card transfer"
        );
        self.driver.protected(
            "p2p/setinput",
            "/payments/p2p/setInput",
            extra,
            fields([
                ("sessionGuid", Value::String(guid.clone())),
                ("payerId", Value::String(format!("cardNumber:{payer_number}"))),
                (
                    "recipientId",
                    Value::String(format!("cardNumber:{}", transfer.recipient_card_number)),
                ),
                ("amount", Value::String(transfer.amount.clone())),
            ]),
        )?;

        self.driver
            .plain("p2p/commission", Method::Get, "/payments/p2p/commission")?;

        let confirm = self.driver.protected(
            "p2p/confirm",
            "/payments/p2p/confirm",
            self.password_fields()?,
            fields([("sessionGuid", Value::String(guid))]),
        )?;

        let redirect_url = confirm
            .str_field("redirectUrl")
            .filter(|url| !url.trim().is_empty())
            .map(str::to_string);
        if let Some(url) = &redirect_url {
            if let Err(e) = self.browser.open(url) {
                tracing::warn!(error = %e, "could not open 3-D Secure page");
            }
        }

        Ok(PaymentOutcome {
            amount: transfer.amount.clone(),
            confirmation: confirm.body,
            redirect_url,
        })
    }

    /// Save the recipient card of the last transfer as `card_name`.
    pub fn save_card_from_last_payment(&self, card_name: &str) -> Result<StepResponse, HarnessError> {
        self.driver.protected(
            "p2p/savecard",
            "/payments/savedCards/saveFromLastPayment",
            self.password_fields()?,
            fields([("cardName", Value::String(card_name.to_string()))]),
        )
    }
}
