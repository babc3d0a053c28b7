// self
use paygate_core::{
	_preludet::*,
	auth::{OperationReference, ProductScope},
	gateway::GatewayRequest,
	sign::{RequestSigner, SignatureScheme, SignatureVerifier, canonical_input},
};

const PRIVATE_PEM: &str = include_str!("fixtures/rsa_signing_key.pem");
const PUBLIC_PEM: &str = include_str!("fixtures/rsa_signing_key.pub.pem");

fn collection() -> ProductScope {
	ProductScope::new("collection").expect("Product fixture should be valid.")
}

fn accepting_gateway() -> Arc<ScriptedHttpClient> {
	Arc::new(ScriptedHttpClient::gateway(|_| json_response(202, "")))
}

#[tokio::test]
async fn rsa_signed_bodies_verify_with_the_public_key() {
	let client = accepting_gateway();
	let signer = RequestSigner::rsa_sha256_pem(PRIVATE_PEM).expect("Fixture key should parse.");
	let executor = build_scripted_executor(client.clone()).with_signer(signer);
	let body = br#"{"amount":"100","currency":"EUR"}"#.to_vec();

	executor
		.execute(
			GatewayRequest::post(collection(), "/disbursement/v1_0/transfer")
				.body(body.clone(), "application/json")
				.signed_body(),
		)
		.await
		.expect("Signed transfer should be accepted.");

	let sent = client
		.requests()
		.into_iter()
		.find(|request| request.path == "/disbursement/v1_0/transfer")
		.expect("Transfer request should be recorded.");
	let signature = sent.header("x-signature").expect("Signature header should be present.");
	let verifier =
		SignatureVerifier::rsa_sha256_public_pem(PUBLIC_PEM).expect("Fixture key should parse.");

	assert_eq!(sent.body, body);
	assert!(verifier.verify(signature, &body));
	assert!(!verifier.verify(signature, br#"{"amount":"999","currency":"EUR"}"#));
}

#[tokio::test]
async fn canonical_strings_are_signed_instead_of_the_body() {
	let client = accepting_gateway();
	let signer = RequestSigner::hmac_sha256("callback-secret").expect("Signer should build.");
	let executor = build_scripted_executor(client.clone()).with_signer(signer);
	let reference = OperationReference::generate();
	let canonical = canonical_input(["100", "EUR", reference.as_ref()], "|");

	executor
		.execute(
			GatewayRequest::post(collection(), "/collection/v1_0/requesttopay")
				.body(br#"{"amount":"100"}"#.to_vec(), "application/json")
				.reference(reference.clone())
				.sign_over(canonical.clone()),
		)
		.await
		.expect("Signed submission should be accepted.");

	let sent = client
		.requests()
		.into_iter()
		.find(|request| request.path == "/collection/v1_0/requesttopay")
		.expect("Submission should be recorded.");
	let signature = sent.header("x-signature").expect("Signature header should be present.");
	let verifier = SignatureVerifier::hmac_sha256("callback-secret").expect("Verifier should build.");
	let stranger = SignatureVerifier::hmac_sha256("other-secret").expect("Verifier should build.");

	assert_eq!(sent.header("x-reference-id"), Some(reference.as_ref()));
	assert!(verifier.verify(signature, canonical.as_bytes()));
	assert!(!verifier.verify(signature, &sent.body));
	assert!(!stranger.verify(signature, canonical.as_bytes()));
}

#[test]
fn rsa_signatures_are_deterministic_and_scheme_tagged() {
	let signer = RequestSigner::rsa_sha256_pem(PRIVATE_PEM).expect("Fixture key should parse.");
	let payload = b"amount=100|currency=EUR|reference=abc";
	let first = signer.sign(payload).expect("Payload should sign.");
	let second = signer.sign(payload).expect("Payload should sign.");

	assert_eq!(signer.scheme(), SignatureScheme::RsaSha256);
	assert_eq!(first, second);
	assert!(signer.verify(&first, payload));
	assert!(
		RequestSigner::rsa_sha256_pem(PUBLIC_PEM).is_err(),
		"Public keys must not be accepted as signing keys."
	);
}
