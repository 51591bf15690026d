//! Deep-link providers: no API, the invitation is a prefilled app link
//! (`https://wa.me/<phone>?text=<message>`) the user opens on their device.

use helpnet_core::provider::Provider;
use url::Url;

use super::{AuthOutcome, ConnectorError, Delivery, Invitation};
use crate::vault::ProviderToken;

/// There is nothing to authenticate against; the session only records that
/// the user linked the provider.
pub(super) fn authenticate(provider: &Provider) -> Result<AuthOutcome, ConnectorError> {
  Ok(AuthOutcome::Token(ProviderToken::new(format!("deeplink:{}", provider.id))))
}

pub(super) fn deliver(
  provider: &Provider,
  invitation: &Invitation<'_>,
) -> Result<Delivery, ConnectorError> {
  let base = provider
    .link_base
    .as_deref()
    .ok_or_else(|| ConnectorError::Protocol(format!("no link base configured for {}", provider.id)))?;
  let phone = invitation
    .friend
    .phone()
    .map(dial_digits)
    .filter(|d| !d.is_empty())
    .ok_or(ConnectorError::Unsupported("contact has no phone number"))?;

  let mut url =
    Url::parse(base).map_err(|e| ConnectorError::Protocol(format!("bad link base: {e}")))?;
  url
    .path_segments_mut()
    .map_err(|()| ConnectorError::Protocol("link base cannot take a path".into()))?
    .pop_if_empty()
    .push(&phone);
  url.query_pairs_mut().append_pair("text", invitation.message);

  Ok(Delivery { deep_link: Some(url.into()) })
}

/// International number as bare digits, the form app links expect.
fn dial_digits(phone: &str) -> String { phone.chars().filter(char::is_ascii_digit).collect() }

#[cfg(test)]
mod tests {
  use helpnet_core::{
    friend::{ContactChannel, Friend},
    provider::IntegrationMethod,
  };
  use uuid::Uuid;

  use super::*;
  use crate::connector::DispatchRoute;

  fn whatsapp() -> Provider {
    let mut p = Provider::new("whatsapp", IntegrationMethod::Deeplink);
    p.link_base = Some("https://wa.me".into());
    p
  }

  fn friend(contact: Option<ContactChannel>) -> Friend {
    Friend {
      external_id: "wa-1".into(),
      display_name: "Ann".into(),
      provider: "whatsapp".into(),
      owner_id: Uuid::nil(),
      contact,
    }
  }

  #[test]
  fn link_carries_digits_and_encoded_text() {
    let f = friend(Some(ContactChannel::Phone("+33 6 12-34-56-78".into())));
    let invitation = Invitation { friend: &f, message: "Join me & help: t=abc", route: DispatchRoute::DeepLink };
    let link = deliver(&whatsapp(), &invitation).unwrap().deep_link.unwrap();

    let url = Url::parse(&link).unwrap();
    assert_eq!(url.host_str(), Some("wa.me"));
    assert_eq!(url.path(), "/33612345678");
    let text = url.query_pairs().find(|(k, _)| k == "text").unwrap().1.into_owned();
    assert_eq!(text, "Join me & help: t=abc");
  }

  #[test]
  fn missing_phone_is_unsupported() {
    let f = friend(None);
    let invitation = Invitation { friend: &f, message: "hi", route: DispatchRoute::DeepLink };
    assert!(matches!(deliver(&whatsapp(), &invitation), Err(ConnectorError::Unsupported(_))));
  }

  #[test]
  fn session_never_expires() {
    let AuthOutcome::Token(token) = authenticate(&whatsapp()).unwrap() else {
      panic!("expected a token");
    };
    assert!(token.expires_at().is_none());
  }
}
