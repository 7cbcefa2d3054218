//! All user-facing Portuguese copy in one place.
//!
//! Keeping the strings together makes wording reviews possible without
//! touching flow logic. Dynamic pieces are small `fn`s, fixed pieces are
//! consts.

/// Menu shown at the choice stage and re-shown on unrecognized input.
pub fn menu(first_name: Option<&str>) -> String {
    let greeting = match first_name {
        Some(name) => format!("Olá {name}! 👋"),
        None => "Olá! 👋".to_string(),
    };
    format!(
        "{greeting}\n\n\
        Como posso ajudar com o teu crédito habitação?\n\n\
        ▪️ Escreve *DÚVIDA* para fazer uma pergunta\n\
        ▪️ Escreve *GESTORA* para avançar com a tua gestora\n\
        ▪️ Escreve *SIMULADOR* para uma estimativa rápida\n\
        ▪️ Escreve *FALAR COM RAFA* para falar com a nossa equipa"
    )
}

/// Appended to every Nth answered reply so contacts remember the commands.
pub const NAV_FOOTER: &str = "\n\n💡 Lembra-te: podes escrever *DÚVIDA* para outra \
pergunta, *GESTORA* para avançar ou *FALAR COM RAFA* para falar com a equipa.";

pub const ASK_QUESTION: &str = "Perfeito! Escreve a tua pergunta e termina com *?* \
para eu saber que concluíste. 😊";

/// Nudge sent when a question fragment sits in the buffer too long.
pub const BUFFER_REMINDER: &str = "Peço que ao final da sua pergunta adicione um \"?\" \
para eu entender que concluíste ok? 😊";

pub const GREETING_RESPONSE: &str = "Olá! 😊 Em que posso ajudar? Escreve a tua \
pergunta terminada com *?*.";

pub const QUESTION_TOO_SHORT: &str = "Não consegui perceber a pergunta. Podes \
reformular com um pouco mais de detalhe, terminando com *?*";

pub const QUESTION_LIMIT_REACHED: &str = "Já respondi a bastantes perguntas hoje! 😅 \
Para continuar, escreve *FALAR COM RAFA* e a nossa equipa ajuda-te em breve.";

pub const PENDING_CREATED: &str = "Boa pergunta! 🤔 Ainda não tenho uma resposta \
preparada, por isso encaminhei-a para a nossa equipa. Assim que tivermos a resposta, \
entro em contacto contigo.";

pub const PENDING_DUPLICATE: &str = "Essa pergunta já está com a nossa equipa! 🙌 \
Assim que tivermos a resposta, entro em contacto contigo.";

pub const MATCH_UNAVAILABLE: &str = "Estou com dificuldades em processar a tua \
pergunta neste momento. 😕 Tenta novamente daqui a pouco, por favor.";

pub const RETRY_OR_ESCALATE: &str = "Algo correu mal ao registar a tua pergunta. 😕 \
Tenta novamente daqui a pouco ou escreve *FALAR COM RAFA* para falar com a equipa.";

// ── Document collection ─────────────────────────────────────────────

pub fn docs_request(upload_url: &str, first_name: Option<&str>) -> String {
    let name = first_name.unwrap_or("");
    let intro = if name.is_empty() {
        "Ótimo, vamos avançar com a tua gestora! 🎉".to_string()
    } else {
        format!("Ótimo {name}, vamos avançar com a tua gestora! 🎉")
    };
    format!(
        "{intro}\n\n\
        Para prepararmos o teu processo, envia os teus documentos através deste link \
        seguro:\n{upload_url}\n\n\
        Precisamos de: documento de identificação, comprovativo de rendimentos e \
        extrato bancário dos últimos 3 meses."
    )
}

pub const DOCS_REMINDER: &str = "Estamos a aguardar os teus documentos. 📄 Usa o link \
que te enviei para os carregar. Se precisares de ajuda, escreve *FALAR COM RAFA*.";

pub const DOCS_RECEIVED: &str = "Recebemos os teus documentos! ✅ A tua gestora vai \
analisá-los e entra em contacto contigo muito em breve.";

pub const DOCS_RECEIVED_REMINDER: &str = "Os teus documentos já estão com a tua \
gestora. ✅ Ela entra em contacto contigo muito em breve. Se tiveres dúvidas, escreve \
*DÚVIDA*.";

// ── Human handoff ───────────────────────────────────────────────────

pub fn human_handoff_ack(first_name: Option<&str>) -> String {
    match first_name {
        Some(name) => format!(
            "Claro {name}! 🤝 Avisei a nossa equipa e a Rafa vai falar contigo o mais \
            rápido possível."
        ),
        None => "Claro! 🤝 Avisei a nossa equipa e a Rafa vai falar contigo o mais \
            rápido possível."
            .to_string(),
    }
}

/// Alert sent to the operator number, with a deep link to the contact.
pub fn admin_alert(first_name: Option<&str>, wa_number: &str) -> String {
    let name = first_name.unwrap_or("(sem nome)");
    format!(
        "🔔 *Pedido de contacto humano*\n\
        Nome: {name}\n\
        Número: {wa_number}\n\
        Abrir conversa: https://wa.me/{wa_number}"
    )
}

// ── Welcome sequence ────────────────────────────────────────────────

/// Immediate reply to the trigger phrase; the rest arrives via the queue.
pub fn welcome_greeting(first_name: Option<&str>) -> String {
    match first_name {
        Some(name) => format!("Olá {name}! 👋 Que bom ter-te por aqui."),
        None => "Olá! 👋 Que bom ter-te por aqui.".to_string(),
    }
}

pub const WELCOME_STEP_1: &str = "Sou a assistente virtual da equipa da Rafa e vou \
ajudar-te a perceber como funciona o crédito habitação em Portugal. 🏠";

pub const WELCOME_STEP_2: &str = "Trabalhamos com as principais instituições \
bancárias e acompanhamos o teu processo do início ao fim, sem custos para ti.";

/// Asset key resolved to a signed URL at send time.
pub const WELCOME_AUDIO_ASSET: &str = "welcome-intro";

pub const WELCOME_STEP_4: &str = "Quando estiveres pronto, escreve *COMEÇAR* e eu \
mostro-te as opções. 😊";

// ── Simulator ───────────────────────────────────────────────────────

pub const SIM_ASK_AGE: &str = "Vamos simular! 🧮 Primeiro: que idade tens?";

pub const SIM_ASK_PROPERTY_VALUE: &str = "E qual é o valor do imóvel que tens em \
mente? (por exemplo: 250.000)";

pub const SIM_ASK_TERM: &str = "Em quantos anos gostarias de pagar o crédito? \
(entre 5 e 40)";

pub const SIM_ASK_DOWN_PAYMENT: &str = "Quanto tens disponível para entrada? \
(por exemplo: 50.000)";

pub const SIM_INVALID_AGE: &str = "Preciso de uma idade entre 18 e 75 anos. Podes \
repetir?";

pub const SIM_INVALID_PROPERTY_VALUE: &str = "Não percebi o valor. 😅 Escreve só o \
montante, por exemplo: 250.000";

pub const SIM_INVALID_TERM: &str = "O prazo tem de estar entre 5 e 40 anos. Quantos \
anos preferes?";

pub const SIM_INVALID_DOWN_PAYMENT: &str = "Não percebi a entrada. 😅 Escreve só o \
montante, e tem de ser inferior ao valor do imóvel.";

pub fn sim_result(financed: &str, monthly: &str, years: u32) -> String {
    format!(
        "Aqui está a tua estimativa: 📊\n\n\
        ▪️ Montante financiado: € {financed}\n\
        ▪️ Prestação mensal: € {monthly}\n\
        ▪️ Prazo: {years} anos\n\n\
        Esta é uma simulação indicativa. Para valores reais e condições \
        personalizadas, escreve *GESTORA* e avançamos com o teu processo! 🚀"
    )
}

/// Join a FAQ entry's answers into one message body.
pub fn format_answer(answers: &[String]) -> String {
    answers.join("\n\n")
}
