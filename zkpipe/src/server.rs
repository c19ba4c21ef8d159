use std::path::Path;
use std::sync::Arc;

use actix_web::{web, App, HttpResponse, HttpServer};
use log::{debug, error, info, warn};

use crate::errors::{PipelineError, PipelineResult};
use crate::native::NativeVerifier;
use crate::proof::{load_verification_key, parse_public_signals, Groth16Proof};
use crate::response::{VerificationRequest, VerificationResponse, VERIFY_PATH};

pub type ValidProofHandler = Box<dyn Fn(&[String]) -> Result<(), String> + Send + Sync>;
pub type InvalidProofHandler = Box<dyn Fn(&str) -> Result<(), String> + Send + Sync>;
pub type ErrorHandler = Box<dyn Fn(&PipelineError) -> Result<(), String> + Send + Sync>;

/// HTTP front for the off-chain verifier of one circuit.
pub struct ServerApp {
    listen_address: String,
    verifier: NativeVerifier,
    valid_proof_handler: Option<ValidProofHandler>,
    invalid_proof_handler: Option<InvalidProofHandler>,
    error_handler: Option<ErrorHandler>,
}

impl ServerApp {
    pub fn new(listen_address: impl Into<String>, verification_key_path: &Path) -> PipelineResult<Self> {
        debug!("Creating new ServerApp instance");
        let vk = load_verification_key(verification_key_path)?;
        let verifier = NativeVerifier::new(&vk).map_err(|reason| {
            PipelineError::format("verification key", verification_key_path, reason)
        })?;
        info!(
            "Verification key loaded from {} ({} public signals)",
            verification_key_path.display(),
            verifier.n_public()
        );

        Ok(Self {
            listen_address: listen_address.into(),
            verifier,
            valid_proof_handler: None,
            invalid_proof_handler: None,
            error_handler: None,
        })
    }

    pub fn with_valid_proof_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&[String]) -> Result<(), String> + Send + Sync + 'static,
    {
        self.valid_proof_handler = Some(Box::new(handler));
        self
    }

    pub fn with_invalid_proof_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) -> Result<(), String> + Send + Sync + 'static,
    {
        self.invalid_proof_handler = Some(Box::new(handler));
        self
    }

    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PipelineError) -> Result<(), String> + Send + Sync + 'static,
    {
        self.error_handler = Some(Box::new(handler));
        self
    }

    fn verify(&self, request: &VerificationRequest) -> PipelineResult<bool> {
        let proof = Groth16Proof::try_from(&request.proof)
            .map_err(|reason| PipelineError::format("proof", "request body", reason))?;
        let public = parse_public_signals(&request.public_signals)
            .map_err(|reason| PipelineError::format("public signals", "request body", reason))?;
        let result = self.verifier.verify(&public, &proof)?;
        debug!("Proof verification result: {}", result);
        Ok(result)
    }

    fn report_error(&self, e: &PipelineError) -> HttpResponse {
        if let Some(handler) = &self.error_handler {
            if let Err(handler_err) = handler(e) {
                error!("Error handler failed: {}", handler_err);
            }
        }
        HttpResponse::InternalServerError().json(VerificationResponse::Error {
            error: e.to_string(),
        })
    }

    async fn verify_handler(
        request: web::Json<VerificationRequest>,
        app: web::Data<Arc<Self>>,
    ) -> HttpResponse {
        debug!(
            "Received verification request with {} public signals",
            request.public_signals.len()
        );
        match app.verify(&request) {
            Ok(true) => {
                info!("Proof verified for public signals {:?}", request.public_signals);
                if let Some(handler) = &app.valid_proof_handler {
                    if let Err(e) = handler(&request.public_signals) {
                        error!("Valid proof handler failed: {}", e);
                        return HttpResponse::InternalServerError()
                            .json(VerificationResponse::Error { error: e });
                    }
                }
                HttpResponse::Ok().json(VerificationResponse::Valid {
                    public_signals: request.public_signals.clone(),
                })
            }
            Ok(false) => {
                warn!("Invalid proof received");
                let reason = "Proof verification failed".to_string();
                if let Some(handler) = &app.invalid_proof_handler {
                    if let Err(e) = handler(&reason) {
                        error!("Invalid proof handler failed: {}", e);
                        return HttpResponse::InternalServerError()
                            .json(VerificationResponse::Error { error: e });
                    }
                }
                HttpResponse::BadRequest().json(VerificationResponse::Invalid { reason })
            }
            Err(e) => {
                error!("Verification error: {}", e);
                app.report_error(&e)
            }
        }
    }

    /// Registers the verification route on an actix app.
    pub fn configure(app: Arc<Self>) -> impl Fn(&mut web::ServiceConfig) + Clone {
        move |cfg: &mut web::ServiceConfig| {
            cfg.app_data(web::Data::new(Arc::clone(&app)))
                .route(VERIFY_PATH, web::post().to(Self::verify_handler));
        }
    }

    pub async fn run(self) -> std::io::Result<()> {
        let address = self.listen_address.clone();
        info!("Starting verification service on {}", address);

        let app = Arc::new(self);
        HttpServer::new(move || App::new().configure(Self::configure(Arc::clone(&app))))
            .bind(address)?
            .run()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::fixtures::multiplier_proof;
    use crate::proof::{ProofJson, VerificationKeyJson};
    use actix_web::test;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn server_with_key() -> (ServerApp, ProofJson, tempfile::TempDir) {
        let (vk, proof) = multiplier_proof(3, 4);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verification_key.json");
        crate::artifacts::write_json(&path, &VerificationKeyJson::from(&vk)).unwrap();
        let app = ServerApp::new("127.0.0.1:0", &path).unwrap();
        (app, ProofJson::from(&proof), dir)
    }

    async fn post(app: Arc<ServerApp>, body: &VerificationRequest) -> (u16, VerificationResponse) {
        let service = test::init_service(App::new().configure(ServerApp::configure(app))).await;
        let req = test::TestRequest::post().uri(VERIFY_PATH).set_json(body).to_request();
        let resp = test::call_service(&service, req).await;
        let status = resp.status().as_u16();
        (status, test::read_body_json(resp).await)
    }

    #[actix_web::test]
    async fn answers_valid_invalid_and_error() {
        let (app, proof, _dir) = server_with_key();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);
        let app = Arc::new(app.with_valid_proof_handler(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        let request = |signals: &[&str]| VerificationRequest {
            proof: proof.clone(),
            public_signals: signals.iter().map(|s| s.to_string()).collect(),
        };

        let (status, body) = post(Arc::clone(&app), &request(&["12"])).await;
        assert_eq!(status, 200);
        assert_eq!(body, VerificationResponse::Valid { public_signals: vec!["12".to_string()] });
        assert_eq!(accepted.load(Ordering::SeqCst), 1);

        let (status, body) = post(Arc::clone(&app), &request(&["15"])).await;
        assert_eq!(status, 400);
        assert!(matches!(body, VerificationResponse::Invalid { .. }));

        let (status, body) = post(Arc::clone(&app), &request(&["12", "1"])).await;
        assert_eq!(status, 500);
        assert!(matches!(body, VerificationResponse::Error { error } if error.contains("public signal count")));
    }

    #[actix_web::test]
    async fn error_handler_sees_malformed_requests() {
        let (app, mut proof, _dir) = server_with_key();
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&errors);
        let app = Arc::new(app.with_error_handler(move |e| {
            assert!(matches!(e, PipelineError::Format { .. }), "{:?}", e);
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        proof.pi_a[0] = "not a number".to_string();
        let request = VerificationRequest {
            proof,
            public_signals: vec!["12".to_string()],
        };
        let (status, body) = post(app, &request).await;
        assert_eq!(status, 500);
        assert!(matches!(body, VerificationResponse::Error { .. }));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }
}
