use base64::{engine::general_purpose, Engine as _};

use crate::config::Config;
use crate::gemini::{ModelError, VisionModel};

// ── Constants ────────────────────────────────────────────────────────────────

const USER_AGENT: &str = "alt-text-generator-api/1.0";

/// Declared to the model for every image, whatever the source actually served.
const IMAGE_MIME_TYPE: &str = "image/jpeg";

/// Marker the provider puts in failure descriptions for safety rejections.
const SAFETY_MARKER: &str = "SAFETY";

const PORTUGUESE_INSTRUCTION: &str = "Descreva esta imagem de forma concisa e útil para um texto alternativo (alt text) em português. Foco nos elementos principais e no contexto da imagem. Comece a descrição com 'Imagem de' ou 'Uma imagem de'. Se houver texto, transcreva-o fielmente e mencione que é texto na imagem. Limite a 135 caracteres.";

const SPANISH_INSTRUCTION: &str = "Describe esta imagen de forma concisa y útil para un texto alternativo (alt text) en español. Concéntrate en los elementos principales y el contexto de la imagen. Empieza la descripción con 'Imagen de' o 'Una imagen de'. Si hay texto, transcríbelo fielmente y menciona que es texto en la imagen. Limite a 135 caracteres.";

// ── Error type ───────────────────────────────────────────────────────────────

/// Display strings are the user-facing messages returned in the `error` field.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("URL da imagem e idioma são obrigatórios.")]
    MissingField,
    #[error("Conteúdo bloqueado por filtros de segurança do Gemini. Tente uma imagem diferente.")]
    ContentBlocked,
    #[error("Erro ao gerar texto alternativo: {0}")]
    Generation(String),
}

// ── Public API ───────────────────────────────────────────────────────────────

pub async fn generate_alt_text(
    model: &dyn VisionModel,
    client: &reqwest::Client,
    image_url: &str,
    language: &str,
) -> Result<String, GenerateError> {
    let instruction = instruction_for(language);
    let bytes = fetch_image(client, image_url).await?;
    let encoded = general_purpose::STANDARD.encode(&bytes);

    model
        .describe_image(instruction, IMAGE_MIME_TYPE, &encoded)
        .await
        .map_err(classify_model_error)
}

/// Shared client for fetching image bytes from arbitrary hosts.
pub fn image_client(config: &Config) -> reqwest::Client {
    reqwest::ClientBuilder::new()
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .user_agent(USER_AGENT)
        .build()
        .unwrap()
}

// ── Instruction selection ────────────────────────────────────────────────────

/// Anything other than the "portugues" sentinel falls through to the Spanish
/// template, unrecognized values included. Kept exactly two-way for
/// compatibility with the existing clients.
pub fn instruction_for(language: &str) -> &'static str {
    if language == "portugues" {
        PORTUGUESE_INSTRUCTION
    } else {
        SPANISH_INSTRUCTION
    }
}

// ── Image acquisition ────────────────────────────────────────────────────────

async fn fetch_image(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, GenerateError> {
    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            GenerateError::Generation(format!("TimeoutError: {}", e))
        } else if e.is_connect() {
            GenerateError::Generation(format!("ConnectError: {}", e))
        } else {
            GenerateError::Generation(format!("RequestError: {}", e))
        }
    })?;

    if !response.status().is_success() {
        return Err(GenerateError::Generation(format!(
            "image host returned {}",
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| GenerateError::Generation(e.to_string()))?;

    Ok(bytes.to_vec())
}

// ── Failure classification ───────────────────────────────────────────────────

fn classify_model_error(err: ModelError) -> GenerateError {
    let description = err.to_string();
    if description.contains(SAFETY_MARKER) {
        GenerateError::ContentBlocked
    } else {
        GenerateError::Generation(description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portugues_selects_portuguese_instruction() {
        let instruction = instruction_for("portugues");
        assert!(instruction.contains("em português"));
        assert!(instruction.contains("'Imagem de'"));
    }

    #[test]
    fn espanhol_selects_spanish_instruction() {
        let instruction = instruction_for("espanhol");
        assert!(instruction.contains("en español"));
        assert!(instruction.contains("'Imagen de'"));
    }

    #[test]
    fn unrecognized_language_falls_through_to_spanish() {
        assert_eq!(instruction_for("english"), instruction_for("espanhol"));
        assert_eq!(instruction_for(""), instruction_for("espanhol"));
    }

    #[test]
    fn both_instructions_cap_at_135_characters() {
        assert!(instruction_for("portugues").contains("135 caracteres"));
        assert!(instruction_for("espanhol").contains("135 caracteres"));
    }

    #[test]
    fn safety_marker_classifies_as_content_blocked() {
        let err = classify_model_error(ModelError::PromptBlocked("SAFETY".to_string()));
        assert!(matches!(err, GenerateError::ContentBlocked));
        assert_eq!(
            err.to_string(),
            "Conteúdo bloqueado por filtros de segurança do Gemini. Tente uma imagem diferente."
        );
    }

    #[test]
    fn safety_marker_is_matched_anywhere_in_the_description() {
        let err = classify_model_error(ModelError::Request(
            "candidate finished with reason SAFETY".to_string(),
        ));
        assert!(matches!(err, GenerateError::ContentBlocked));
    }

    #[test]
    fn other_failures_echo_the_description() {
        let err = classify_model_error(ModelError::Request("connection reset".to_string()));
        assert_eq!(
            err.to_string(),
            "Erro ao gerar texto alternativo: RequestError: connection reset"
        );
    }

    #[test]
    fn missing_field_message_is_fixed() {
        assert_eq!(
            GenerateError::MissingField.to_string(),
            "URL da imagem e idioma são obrigatórios."
        );
    }
}
