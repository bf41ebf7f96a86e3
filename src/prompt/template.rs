//! Fixed template text shared by the renderer and the parser.

pub const BOS: &str = "<BOS_TOKEN>";
pub const EOS: &str = "<EOS_TOKEN>";
pub const START_OF_TURN: &str = "<|START_OF_TURN_TOKEN|>";
pub const END_OF_TURN: &str = "<|END_OF_TURN_TOKEN|>";
pub const USER_TOKEN: &str = "<|USER_TOKEN|>";
pub const CHATBOT_TOKEN: &str = "<|CHATBOT_TOKEN|>";
pub const SYSTEM_TOKEN: &str = "<|SYSTEM_TOKEN|>";

/// Markers at which a completion is cut. The first one found wins.
pub const STOP_MARKERS: &[&str] = &[END_OF_TURN, EOS, START_OF_TURN];

/// Introduces the action list in tool mode.
pub const ACTION_MARKER: &str = "Action:";

/// Introduces the cited answer in RAG mode.
pub const GROUNDED_ANSWER_MARKER: &str = "Grounded answer:";

pub const CITATION_OPEN: &str = "<co:";
pub const CITATION_CLOSE: &str = "</co:";

pub const SYSTEM_PREAMBLE: &str = "# System Preamble
## Basic Rules
You are a powerful conversational AI trained to help people. You are augmented by a number of tools, and your job is to use and consume the output of these tools to best help the user. You will see a conversation history between yourself and a user, ending with an utterance from the user. You will then see a specific instruction instructing you what kind of response to generate. When you answer the user's requests, you cite your sources in your answers, according to those instructions.

# User Preamble
## Task and Context
You help people answer their questions and other requests interactively. You should focus on serving the user's needs as best you can, which will be wide-ranging.

## Style Guide
Unless the user asks for a different style of answer, you should answer in full sentences, using proper grammar and spelling.";

pub const TOOLS_HEADER: &str = "## Available Tools
Here is a list of tools that you have available to you:";

/// Built-in tool offered in every tool prompt. Calling it means "answer without tools".
pub const DIRECTLY_ANSWER: &str = "directly_answer";
pub const DIRECTLY_ANSWER_DESCRIPTION: &str =
    "Calls a standard (un-augmented) AI chatbot to generate a response given the conversation history";

pub const ACTION_INSTRUCTION: &str = "Write 'Action:' followed by a json-formatted list of actions that you want to perform in order to produce a good response to the user's last input. You can use any of the supplied tools any number of times, but you should aim to execute the minimum number of necessary actions for the input. If none of the tools are needed, answer the user directly without writing 'Action:'. The list of actions you want to call should be formatted as a list of json objects, for example:
```json
[
    {
        \"tool_name\": title of the tool in the specification,
        \"parameters\": a dict of parameters to input into the tool as they are defined in the specs, or {} if it takes no parameters
    }
]```";

pub const ACCURATE_CITATION_INSTRUCTION: &str = "Carefully perform the following instructions, in order, starting each with a new line.
Firstly, Decide which of the retrieved documents are relevant to the user's last input by writing 'Relevant Documents:' followed by comma-separated list of document numbers. If none are relevant, you should instead write 'None'.
Secondly, Decide which of the retrieved documents contain facts that should be cited in a good answer to the user's last input by writing 'Cited Documents:' followed a comma-separated list of document numbers. If you dont want to cite any of them, you should instead write 'None'.
Thirdly, Write 'Answer:' followed by a response to the user's last input in high quality natural english. Use the retrieved documents to help you. Do not insert any citations or grounding markup.
Finally, Write 'Grounded answer:' followed by a response to the user's last input in high quality natural english. Use the symbols <co: doc> and </co: doc> to indicate when a fact comes from a document in the search result, e.g <co: 0>my fact</co: 0> for a fact from document 0.";

pub const FAST_CITATION_INSTRUCTION: &str = "Carefully perform the following instructions, in order, starting each with a new line.
Firstly, Decide which of the retrieved documents are relevant to the user's last input by writing 'Relevant Documents:' followed by comma-separated list of document numbers. If none are relevant, you should instead write 'None'.
Secondly, Decide which of the retrieved documents contain facts that should be cited in a good answer to the user's last input by writing 'Cited Documents:' followed a comma-separated list of document numbers. If you dont want to cite any of them, you should instead write 'None'.
Finally, Write 'Grounded answer:' followed by a response to the user's last input in high quality natural english. Use the symbols <co: doc> and </co: doc> to indicate when a fact comes from a document in the search result, e.g <co: 0>my fact</co: 0> for a fact from document 0.";
