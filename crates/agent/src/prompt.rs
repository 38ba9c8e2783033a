//! The first user message of a turn.

use lunabridge_core::channel::InboundEvent;

/// Frame the user's text with everything the model needs to reply.
///
/// The reminder spells out the reply tool's `to` and `replyMessageId`
/// arguments so the answer threads under the original message.
pub fn compose_prompt(event: &InboundEvent, user_text: &str, reply_tool: &str) -> String {
    let quoted = event
        .quoted()
        .map(|q| {
            format!(
                "\nMensaje_Citado_Contexto: \"{}\" (Enviado por: {})",
                q.body,
                q.author()
            )
        })
        .unwrap_or_default();

    format!(
        "Usuario_Destino (to): {number}\n\
         Mensaje_Usuario: {user_text}{quoted}\n\
         ID_Mensaje (replyMessageId): {id}\n\n\
         RECUERDA: Responde mediante la herramienta {reply_tool}. \
         En el argumento 'to' debes poner un array de string con ÚNICAMENTE este valor: \"{number}\". \
         En 'replyMessageId' debes usar el ID_Mensaje ({id}).",
        number = event.number,
        id = event.id,
    )
}
