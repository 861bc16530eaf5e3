//! Reqwest-backed [`CodeExchanger`] for commerce platforms that redeem codes at a per-shop
//! endpoint (for example `https://{shop}/admin/oauth/access_token`).
//!
//! Token endpoints answer directly, so the default client does not follow redirects.

// crates.io
use reqwest::{StatusCode, redirect::Policy};
// self
use crate::{
	_prelude::*,
	auth::{AuthorizationCode, ClientId, Credential, ShopId, TokenSecret},
	error::{ConfigError, TransportError},
	exchange::{CodeExchanger, ExchangeFuture},
};

const SHOP_PLACEHOLDER: &str = "{shop}";
const DEFAULT_ENDPOINT_TEMPLATE: &str = "https://{shop}/admin/oauth/access_token";

/// Exchanges authorization codes over HTTPS using `reqwest`.
#[derive(Clone)]
pub struct ReqwestCodeExchanger {
	client: ReqwestClient,
	client_id: ClientId,
	client_secret: TokenSecret,
	endpoint_template: String,
}
impl ReqwestCodeExchanger {
	/// Creates an exchanger with a non-redirecting client and the default endpoint template.
	pub fn new(client_id: ClientId, client_secret: impl Into<String>) -> Result<Self> {
		let client = ReqwestClient::builder()
			.redirect(Policy::none())
			.build()
			.map_err(ConfigError::from)?;

		Ok(Self::with_client(client, client_id, client_secret))
	}

	/// Wraps an existing reqwest client. Configure it not to follow redirects.
	pub fn with_client(
		client: ReqwestClient,
		client_id: ClientId,
		client_secret: impl Into<String>,
	) -> Self {
		Self {
			client,
			client_id,
			client_secret: TokenSecret::new(client_secret),
			endpoint_template: DEFAULT_ENDPOINT_TEMPLATE.into(),
		}
	}

	/// Overrides the endpoint template; it must contain `{shop}`.
	pub fn with_endpoint_template(mut self, template: impl Into<String>) -> Result<Self> {
		let template = template.into();

		if !template.contains(SHOP_PLACEHOLDER) {
			return Err(ConfigError::MissingShopPlaceholder.into());
		}

		self.endpoint_template = template;

		Ok(self)
	}

	/// Renders the exchange endpoint for `shop`.
	pub fn endpoint_for(&self, shop: &ShopId) -> Result<Url> {
		let endpoint = self.endpoint_template.replace(SHOP_PLACEHOLDER, shop);

		Url::parse(&endpoint)
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint, source }.into())
	}

	async fn redeem(
		&self,
		shop: &ShopId,
		code: &AuthorizationCode,
		redirect_uri: &Url,
	) -> Result<Credential> {
		let endpoint = self.endpoint_for(shop)?;
		let body = ExchangeRequest {
			client_id: &self.client_id,
			client_secret: self.client_secret.expose(),
			code: code.expose(),
			redirect_uri: redirect_uri.as_str(),
		};
		let response = self
			.client
			.post(endpoint)
			.json(&body)
			.send()
			.await
			.map_err(TransportError::from)?;
		let status = response.status();
		let bytes = response.bytes().await.map_err(TransportError::from)?;

		if !status.is_success() {
			return Err(map_rejection(status, &bytes));
		}

		let mut deserializer = serde_json::Deserializer::from_slice(&bytes);
		let parsed: ExchangeResponse = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|e| TransportError::malformed(status.as_u16(), e))?;

		parsed.into_credential()
	}
}
impl CodeExchanger for ReqwestCodeExchanger {
	fn exchange_code<'a>(
		&'a self,
		shop: &'a ShopId,
		code: &'a AuthorizationCode,
		redirect_uri: &'a Url,
	) -> ExchangeFuture<'a> {
		Box::pin(self.redeem(shop, code, redirect_uri))
	}
}
impl Debug for ReqwestCodeExchanger {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ReqwestCodeExchanger")
			.field("client_id", &self.client_id)
			.field("client_secret", &self.client_secret)
			.field("endpoint_template", &self.endpoint_template)
			.finish()
	}
}

#[derive(Serialize)]
struct ExchangeRequest<'a> {
	client_id: &'a str,
	client_secret: &'a str,
	code: &'a str,
	redirect_uri: &'a str,
}

#[derive(Deserialize)]
struct ExchangeResponse {
	access_token: String,
	#[serde(default)]
	scope: Option<String>,
	#[serde(default)]
	expires_in: Option<i64>,
}
impl ExchangeResponse {
	fn into_credential(self) -> Result<Credential> {
		let mut builder = Credential::builder(self.access_token);

		if let Some(scope) = self.scope {
			builder = builder.scope(scope);
		}
		if let Some(expires_in) = self.expires_in {
			if expires_in <= 0 {
				return Err(ConfigError::NonPositiveExpiresIn.into());
			}

			builder = builder.expires_in(Duration::seconds(expires_in));
		}

		Ok(builder.build().map_err(ConfigError::from)?)
	}
}

#[derive(Deserialize)]
struct RejectionBody {
	#[serde(alias = "errors")]
	error: String,
	#[serde(default)]
	error_description: Option<String>,
}

fn map_rejection(status: StatusCode, body: &[u8]) -> Error {
	let code = status.as_u16();

	match serde_json::from_slice::<RejectionBody>(body) {
		Ok(RejectionBody { error, error_description }) =>
			Error::Provider { code: error, description: error_description, status: Some(code) },
		// Gateway and server outages without an explicit rejection are retryable.
		Err(_) if status.is_server_error() => TransportError::UpstreamStatus { status: code }.into(),
		Err(_) =>
			Error::Provider { code: format!("http_{code}"), description: None, status: Some(code) },
	}
}
